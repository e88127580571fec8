// End-to-end pipeline tests over a toy index and tempfile-backed inputs.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ribosieve::index::lev::LevTable;
use ribosieve::index::trie::TrieBuilder;
use ribosieve::index::{IndexPart, IndexPartMeta, LmerPositions, RefPosition, RiboIndex};
use ribosieve::nt;
use ribosieve::pipeline::{run_filter, TsvSink};
use ribosieve::stats::ReadStats;
use ribosieve::{FilterError, FilterOpt};

const REF_FASTA: &str = ">AB001.1 16S ribosomal RNA\nACGTACGT\n>CD002.1 23S ribosomal RNA\nTTTTTTTT\n";

/// Toy database: one part over both reference sequences, seed length 8.
/// The forward trie indexes the 4-prefix ACGT of the only interesting L-mer.
fn toy_part() -> IndexPart {
    let mut fwd = TrieBuilder::new(4);
    fwd.insert(&nt::encode(b"ACGT"), 0).unwrap();
    let rev = TrieBuilder::new(4);
    IndexPart {
        meta: IndexPartMeta {
            start_part: 0,
            end_part: REF_FASTA.len() as u64,
            numseq_part: 2,
            seed_len: 8,
            partial_win: 4,
        },
        lev: LevTable::generate(),
        trie_fwd: fwd.build(),
        trie_rev: rev.build(),
        positions: LmerPositions::from_lists(vec![vec![
            RefPosition { ref_id: 0, offset: 0 },
            RefPosition { ref_id: 0, offset: 4 },
        ]]),
    }
}

struct Setup {
    _dir: tempfile::TempDir,
    opt: FilterOpt,
}

fn setup(reads: &str, threads: usize) -> Setup {
    let dir = tempfile::tempdir().unwrap();
    let ref_path = dir.path().join("db.fasta");
    std::fs::write(&ref_path, REF_FASTA).unwrap();
    let index_path = dir.path().join("db.fasta.rsvi");
    RiboIndex::write(&index_path, &[toy_part()]).unwrap();
    let reads_path = dir.path().join("reads.fq");
    std::fs::write(&reads_path, reads).unwrap();
    let workdir = dir.path().join("work");
    std::fs::create_dir(&workdir).unwrap();
    let opt = FilterOpt {
        ref_files: vec![ref_path],
        read_files: vec![reads_path],
        seed_length: 8,
        num_threads: threads,
        min_read_len_threshold: 8,
        workdir: Some(workdir),
        ..FilterOpt::default()
    };
    Setup { _dir: dir, opt }
}

fn run(setup: &Setup) -> (ribosieve::pipeline::FilterSummary, ReadStats, String) {
    let stats = ReadStats::new(&setup.opt.read_files, setup.opt.ref_files.len());
    let cancel = Arc::new(AtomicBool::new(false));
    let mut sink = TsvSink::new(Vec::<u8>::new());
    let summary = run_filter(&setup.opt, &mut sink, &stats, &cancel).unwrap();
    let out = String::from_utf8(sink.into_inner()).unwrap();
    (summary, stats, out)
}

// ACGTACGT and GGCCGGCC are both their own reverse complements; the latter's
// 4-prefix stays four substitutions away from ACGT on both strands. The
// ambiguous read keeps an N inside one half-mer on each strand.
const READS: &str = "@hit\nACGTACGT\n+\nIIIIIIII\n@miss\nGGCCGGCC\n+\nIIIIIIII\n@short\nACG\n+\nIII\n@ambig\nNCGTACGT\n+\nIIIIIIII\n";

#[test]
fn filters_a_small_read_set() {
    let s = setup(READS, 1);
    let (summary, stats, out) = run(&s);

    assert_eq!(summary.reads, 4);
    assert_eq!(summary.bases, 27);
    assert_eq!(summary.reads_with_candidates, 1);
    // ACGTACGT hits ACGT on both strands (its reverse complement is itself),
    // each hit resolving to two reference positions.
    assert_eq!(summary.seed_hits, 2);

    let snap = stats.snapshot();
    assert_eq!(snap.all_reads_count, 4);
    assert_eq!(snap.short_reads_num, 1);
    assert_eq!(snap.total_reads_aligned, 1);
    assert_eq!(snap.reads_matched_per_db, vec![1]);
    assert_eq!(snap.min_read_len, 3);
    assert_eq!(snap.max_read_len, 8);
    assert!(snap.is_stats_calc);

    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines.len(), 4); // 2 hits x 2 positions
    assert!(lines[0].starts_with("hit\t0\t0\t0\t+\t0\tAB001.1\t0"));
    assert!(lines.iter().all(|l| l.contains("AB001.1")));
}

#[test]
fn output_is_identical_across_thread_counts() {
    let single = run(&setup(READS, 1)).2;
    let multi = run(&setup(READS, 4)).2;
    assert_eq!(single, multi);
}

#[test]
fn statistics_are_persisted_and_restorable() {
    let s = setup(READS, 1);
    let (_, stats, _) = run(&s);
    let fresh = ReadStats::new(&s.opt.read_files, 1);
    assert!(fresh.restore(s.opt.workdir.as_ref().unwrap()).unwrap());
    assert_eq!(fresh.snapshot(), stats.snapshot());
}

#[test]
fn pre_set_cancel_flag_aborts_the_run() {
    let s = setup(READS, 1);
    let stats = ReadStats::new(&s.opt.read_files, 1);
    let cancel = Arc::new(AtomicBool::new(false));
    cancel.store(true, Ordering::Relaxed);
    let mut sink = TsvSink::new(Vec::<u8>::new());
    match run_filter(&s.opt, &mut sink, &stats, &cancel) {
        Err(FilterError::Cancelled) => {}
        other => panic!("expected Cancelled, got {:?}", other.map(|s| s.reads)),
    }
}

#[test]
fn seed_length_mismatch_is_rejected() {
    let mut s = setup(READS, 1);
    s.opt.seed_length = 10;
    let stats = ReadStats::new(&s.opt.read_files, 1);
    let cancel = Arc::new(AtomicBool::new(false));
    let mut sink = TsvSink::new(Vec::<u8>::new());
    match run_filter(&s.opt, &mut sink, &stats, &cancel) {
        Err(FilterError::InvalidOption(msg)) => assert!(msg.contains("seed length")),
        other => panic!("expected InvalidOption, got {:?}", other.map(|s| s.reads)),
    }
}

#[test]
fn missing_index_surfaces_as_io_error() {
    let mut s = setup(READS, 1);
    s.opt.index_files = vec![PathBuf::from("/nonexistent/index.rsvi")];
    let stats = ReadStats::new(&s.opt.read_files, 1);
    let cancel = Arc::new(AtomicBool::new(false));
    let mut sink = TsvSink::new(Vec::<u8>::new());
    assert!(matches!(
        run_filter(&s.opt, &mut sink, &stats, &cancel),
        Err(FilterError::Io(_))
    ));
}

#[test]
fn gzipped_reads_pass_through_the_same_pipeline() {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    let s = setup(READS, 1);
    let gz_path = s.opt.read_files[0].with_file_name("reads.fq.gz");
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(READS.as_bytes()).unwrap();
    std::fs::write(&gz_path, enc.finish().unwrap()).unwrap();

    let mut gz_opt = s.opt.clone();
    gz_opt.read_files = vec![gz_path];
    let stats = ReadStats::new(&gz_opt.read_files, 1);
    let cancel = Arc::new(AtomicBool::new(false));
    let mut sink = TsvSink::new(Vec::<u8>::new());
    let summary = run_filter(&gz_opt, &mut sink, &stats, &cancel).unwrap();
    assert_eq!(summary.reads, 4);
    assert_eq!(summary.reads_with_candidates, 1);
    assert_eq!(
        String::from_utf8(sink.into_inner()).unwrap(),
        run(&s).2
    );
}
