use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use ribosieve::pipeline::{self, TsvSink};
use ribosieve::stats::ReadStats;
use ribosieve::{defaults, FilterOpt};

#[derive(Parser)]
#[command(name = "ribosieve")]
#[command(about = "RiboSieve - rRNA read filter for metatranscriptomic and total RNA data", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enumerate candidate rRNA seeds for reads against prebuilt reference indexes
    Filter {
        /// Reference database FASTA (repeatable; expects <FASTA>.rsvi next to
        /// it unless --index is given)
        #[arg(long = "ref", value_name = "FASTA", required = true)]
        refs: Vec<PathBuf>,

        /// Explicit index file(s), parallel to --ref
        #[arg(long = "index", value_name = "IDX")]
        indexes: Vec<PathBuf>,

        /// Reads file(s): FASTA or FASTQ, optionally gzip/BGZF compressed
        #[arg(long = "reads", value_name = "READS", required = true)]
        reads: Vec<PathBuf>,

        /// Seed length (even integer >= 8)
        #[arg(short = 'L', long, value_name = "INT", default_value_t = defaults::SEED_LENGTH)]
        seed_length: u32,

        /// Skip the forward-half search of a window once the reverse half
        /// matched exactly
        #[arg(long)]
        skip_if_zero_kmer_hit: bool,

        /// Reads shorter than INT skip the filter and are only counted
        /// (default: seed length)
        #[arg(long, value_name = "INT")]
        min_read_len: Option<u32>,

        /// Output TSV file (default: stdout)
        #[arg(short = 'o', long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Directory for the persisted run statistics
        #[arg(long, value_name = "DIR")]
        workdir: Option<PathBuf>,

        /// Number of threads (default: all available cores)
        #[arg(short = 't', long, value_name = "INT")]
        threads: Option<usize>,

        /// Verbose level: 1=error, 2=warning, 3=message, 4+=debugging
        #[arg(short = 'v', long, value_name = "INT", default_value_t = defaults::VERBOSITY)]
        verbosity: i32,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Filter {
            refs,
            indexes,
            reads,
            seed_length,
            skip_if_zero_kmer_hit,
            min_read_len,
            output,
            workdir,
            threads,
            verbosity,
        } => {
            let log_level = match verbosity {
                v if v <= 1 => log::LevelFilter::Error,
                2 => log::LevelFilter::Warn,
                3 => log::LevelFilter::Info,
                4 => log::LevelFilter::Debug,
                _ => log::LevelFilter::Trace,
            };
            env_logger::Builder::from_default_env()
                .filter_level(log_level)
                .format_timestamp(None)
                .format_target(false)
                .init();

            let mut num_threads = threads.unwrap_or_else(num_cpus::get);
            if num_threads < 1 {
                log::warn!("Invalid thread count {}, using 1 thread", num_threads);
                num_threads = 1;
            }
            let max_threads = num_cpus::get() * 2;
            if num_threads > max_threads {
                log::warn!(
                    "Thread count {} exceeds recommended maximum {}, capping at {}",
                    num_threads,
                    max_threads,
                    max_threads
                );
                num_threads = max_threads;
            }

            if let Err(e) = rayon::ThreadPoolBuilder::new()
                .num_threads(num_threads)
                .build_global()
            {
                log::warn!(
                    "Failed to configure thread pool: {} (may already be initialized)",
                    e
                );
            }
            log::info!(
                "Using {} {}",
                num_threads,
                if num_threads == 1 { "thread" } else { "threads" }
            );

            let opt = FilterOpt {
                ref_files: refs,
                index_files: indexes,
                read_files: reads,
                seed_length,
                skip_if_zero_kmer_hit,
                num_threads,
                min_read_len_threshold: min_read_len.unwrap_or(seed_length),
                workdir,
            };
            if let Err(e) = opt.validate() {
                log::error!("{}", e);
                std::process::exit(1);
            }

            if verbosity >= 3 {
                log::info!("Seed parameters:");
                log::info!("  Seed length: {}", opt.seed_length);
                log::info!("  Half-window: {}", opt.partial_win());
                log::info!("  Exact-half skip: {}", opt.skip_if_zero_kmer_hit);
                log::info!("  Min read length: {}", opt.min_read_len_threshold);
            }

            let writer: Box<dyn Write> = match &output {
                Some(path) => match File::create(path) {
                    Ok(f) => Box::new(BufWriter::new(f)),
                    Err(e) => {
                        log::error!("Error creating output file {}: {}", path.display(), e);
                        std::process::exit(1);
                    }
                },
                None => Box::new(io::stdout()),
            };
            let mut sink = TsvSink::new(writer);

            let stats = ReadStats::new(&opt.read_files, opt.ref_files.len());
            let cancel = Arc::new(AtomicBool::new(false));

            match pipeline::run_filter(&opt, &mut sink, &stats, &cancel) {
                Ok(summary) => {
                    log::info!(
                        "{} of {} reads have candidate seeds",
                        summary.reads_with_candidates,
                        summary.reads
                    );
                }
                Err(e) => {
                    log::error!("{}", e);
                    std::process::exit(1);
                }
            }

            if let Err(e) = sink.into_inner().flush() {
                log::error!("Error flushing output: {}", e);
                std::process::exit(1);
            }
        }
    }
}
