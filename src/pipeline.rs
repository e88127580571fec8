//! Filtering pipeline: index parts outside, read batches inside.
//!
//! For every reference database, and for every index part within it, the
//! read files are streamed once more: a reader thread feeds batches through
//! a bounded channel, a rayon fan-out runs the seed enumerator per read, and
//! a sequential stage hands each read's candidates to the [`SeedSink`] and
//! updates the statistics. Part transitions are barriers: a batch loop
//! finishes completely before the next part is loaded, and only one part's
//! tries and references are resident at a time.

use crossbeam_channel::bounded;
use rayon::prelude::*;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crate::defaults;
use crate::error::{FilterError, Result};
use crate::index::refs::References;
use crate::index::{IndexPart, RiboIndex};
use crate::io::reads::{ReadBatch, ReadsReader};
use crate::opts::FilterOpt;
use crate::search::seed::{SeedEnumerator, SeedHit};
use crate::stats::ReadStats;

/// What the sink learns about the read a hit list belongs to.
pub struct ReadContext<'a> {
    /// Global ordinal of the read across all read files (stable between
    /// index-part passes).
    pub ordinal: u64,
    pub id: &'a str,
    /// Numeric sequence.
    pub seq: &'a [u8],
}

/// Consumer of per-read seed candidates; the scorer sits behind this seam.
pub trait SeedSink {
    fn consume(
        &mut self,
        read: &ReadContext<'_>,
        hits: &[SeedHit],
        part: &IndexPart,
        refs: &References,
        db: usize,
    ) -> Result<()>;
}

/// Built-in sink writing one line per resolved candidate position.
pub struct TsvSink<W: Write> {
    out: W,
}

impl<W: Write> TsvSink<W> {
    pub fn new(out: W) -> Self {
        TsvSink { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> SeedSink for TsvSink<W> {
    fn consume(
        &mut self,
        read: &ReadContext<'_>,
        hits: &[SeedHit],
        part: &IndexPart,
        refs: &References,
        db: usize,
    ) -> Result<()> {
        for hit in hits {
            let strand = if hit.forward { '+' } else { '-' };
            for pos in part.positions.get(hit.trie_key) {
                let ref_id = refs
                    .get(pos.ref_id as usize)
                    .map(|r| r.id())
                    .unwrap_or("?");
                writeln!(
                    self.out,
                    "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
                    read.id, db, refs.part, hit.window, strand, hit.trie_key, ref_id, pos.offset
                )?;
            }
        }
        Ok(())
    }
}

/// Run totals reported back to the caller.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FilterSummary {
    pub reads: u64,
    pub bases: u64,
    /// Reads with at least one candidate in any database.
    pub reads_with_candidates: u64,
    /// Total emitted seed hits over all parts and databases.
    pub seed_hits: u64,
}

/// Per-read result of the parallel stage.
enum ReadOutcome {
    Hits(Vec<SeedHit>),
    Cancelled,
}

/// Run the whole filter. `stats` must be sized for `opt.ref_files.len()`
/// databases.
pub fn run_filter(
    opt: &FilterOpt,
    sink: &mut dyn SeedSink,
    stats: &ReadStats,
    cancel: &Arc<AtomicBool>,
) -> Result<FilterSummary> {
    opt.validate()?;
    let start_time = Instant::now();

    let batch_size = (defaults::CHUNK_SIZE_BASES * opt.num_threads / defaults::AVG_READ_LEN)
        .max(defaults::MIN_BATCH_SIZE);
    log::debug!(
        "using batch size {} reads ({} threads x {} MB/thread)",
        batch_size,
        opt.num_threads,
        defaults::CHUNK_SIZE_BASES / 1_000_000
    );

    let mut summary = FilterSummary::default();
    // Which reads have produced a candidate, by global ordinal; one lane
    // overall and one per database for the unique-read counters.
    let mut aligned = Vec::<bool>::new();
    let mut matched_db: Vec<Vec<bool>> = vec![Vec::new(); opt.ref_files.len()];
    let mut first_pass = true;

    for (db, ref_file) in opt.ref_files.iter().enumerate() {
        let index_path = opt.index_path(db);
        let index = RiboIndex::open(&index_path)?;
        log::info!(
            "database {} ({}): {} index part(s)",
            db,
            ref_file.display(),
            index.num_parts()
        );

        for part_num in 0..index.num_parts() {
            let part = index.load_part(part_num)?;
            if part.meta.seed_len != opt.seed_length {
                return Err(FilterError::InvalidOption(format!(
                    "index {} was built for seed length {}, run is configured for {}",
                    index_path.display(),
                    part.meta.seed_len,
                    opt.seed_length
                )));
            }
            let mut refs = References::load(ref_file, db as u32, part_num as u32, &part.meta)?;
            log::info!(
                "  part {}: {} reference sequences, {} forward / {} reverse trie keys",
                part_num,
                refs.len(),
                part.trie_fwd.num_keys(),
                part.trie_rev.num_keys()
            );

            process_part(
                opt,
                sink,
                stats,
                cancel,
                &part,
                &refs,
                db,
                batch_size,
                first_pass,
                &mut aligned,
                &mut matched_db[db],
                &mut summary,
            )?;

            refs.unload();
            first_pass = false;
        }
    }

    stats.is_stats_calc.store(true, Ordering::Relaxed);
    if let Some(dir) = &opt.workdir {
        stats.store(dir)?;
    }

    summary.reads = stats.all_reads_count.load(Ordering::Relaxed);
    summary.bases = stats.all_reads_len.load(Ordering::Relaxed);
    summary.reads_with_candidates = aligned.iter().filter(|&&a| a).count() as u64;
    log::info!(
        "processed {} reads ({} bp) in {:.2} sec: {} with candidates, {} seed hits",
        summary.reads,
        summary.bases,
        start_time.elapsed().as_secs_f64(),
        summary.reads_with_candidates,
        summary.seed_hits
    );
    Ok(summary)
}

/// One pass of all read files against one index part.
#[allow(clippy::too_many_arguments)]
fn process_part(
    opt: &FilterOpt,
    sink: &mut dyn SeedSink,
    stats: &ReadStats,
    cancel: &Arc<AtomicBool>,
    part: &IndexPart,
    refs: &References,
    db: usize,
    batch_size: usize,
    first_pass: bool,
    aligned: &mut Vec<bool>,
    matched: &mut Vec<bool>,
    summary: &mut FilterSummary,
) -> Result<()> {
    let (sender, receiver) = bounded::<std::io::Result<ReadBatch>>(defaults::BATCH_CHANNEL_BOUND);
    let read_files = opt.read_files.clone();
    let reader = thread::spawn(move || {
        for path in &read_files {
            let mut reader = match ReadsReader::new(path) {
                Ok(r) => r,
                Err(e) => {
                    let _ = sender.send(Err(e));
                    return;
                }
            };
            loop {
                match reader.read_batch(batch_size) {
                    Ok(batch) if batch.is_empty() => break,
                    Ok(batch) => {
                        if sender.send(Ok(batch)).is_err() {
                            return; // receiver gone: cancelled or failed
                        }
                    }
                    Err(e) => {
                        let _ = sender.send(Err(e));
                        return;
                    }
                }
            }
        }
    });

    let min_len = opt.min_read_len_threshold;
    let seed_len = part.meta.seed_len as usize;
    let mut ordinal_base = 0u64;
    let mut result = Ok(());

    'batches: for batch in receiver.iter() {
        let batch = match batch {
            Ok(b) => b,
            Err(e) => {
                result = Err(e.into());
                break;
            }
        };
        if cancel.load(Ordering::Relaxed) {
            result = Err(FilterError::Cancelled);
            break;
        }

        let outcomes: Vec<ReadOutcome> = batch
            .seqs
            .par_iter()
            .map(|seq| {
                if first_pass {
                    stats.record_read(seq.len(), min_len);
                }
                if (seq.len() as u32) < min_len || seq.len() < seed_len {
                    return ReadOutcome::Hits(Vec::new());
                }
                let enumerator =
                    SeedEnumerator::new(part, opt.skip_if_zero_kmer_hit, cancel.as_ref());
                match enumerator.enumerate(seq) {
                    Ok(hits) => ReadOutcome::Hits(hits),
                    Err(FilterError::Cancelled) => ReadOutcome::Cancelled,
                    Err(_) => unreachable!("enumeration only fails on cancellation"),
                }
            })
            .collect();

        let mut cancelled = false;
        for (i, outcome) in outcomes.iter().enumerate() {
            let hits = match outcome {
                ReadOutcome::Hits(h) => h,
                ReadOutcome::Cancelled => {
                    cancelled = true;
                    continue;
                }
            };
            if hits.is_empty() {
                continue;
            }
            let ordinal = ordinal_base + i as u64;
            let ctx = ReadContext {
                ordinal,
                id: &batch.ids[i],
                seq: &batch.seqs[i],
            };
            if let Err(e) = sink.consume(&ctx, hits, part, refs, db) {
                result = Err(e);
                break 'batches;
            }
            summary.seed_hits += hits.len() as u64;

            let idx = ordinal as usize;
            if aligned.len() <= idx {
                aligned.resize(idx + 1, false);
            }
            if !aligned[idx] {
                aligned[idx] = true;
                stats.add_aligned();
            }
            if matched.len() <= idx {
                matched.resize(idx + 1, false);
            }
            if !matched[idx] {
                matched[idx] = true;
                stats.add_matched(db);
            }
        }
        if cancelled {
            result = Err(FilterError::Cancelled);
            break;
        }
        ordinal_base += batch.len() as u64;
    }

    // Unblock and retire the reader before surfacing any error.
    drop(receiver);
    let _ = reader.join();
    result
}
