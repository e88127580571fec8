// Criterion benchmark for the seed enumerator hot path.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::atomic::AtomicBool;

use ribosieve::index::lev::LevTable;
use ribosieve::index::trie::TrieBuilder;
use ribosieve::index::{IndexPart, IndexPartMeta, LmerPositions};
use ribosieve::search::seed::SeedEnumerator;

const PARTIAL_WIN: u32 = 9;
const SEED_LEN: u32 = 18;

/// Deterministic xorshift so the bench needs no RNG dependency.
struct XorShift(u64);

impl XorShift {
    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    fn base(&mut self) -> u8 {
        (self.next() % 4) as u8
    }
}

fn build_part(num_halfmers: usize) -> IndexPart {
    let mut rng = XorShift(0x9e37_79b9_7f4a_7c15);
    let mut fwd = TrieBuilder::new(PARTIAL_WIN);
    let mut rev = TrieBuilder::new(PARTIAL_WIN);
    for key in 0..num_halfmers {
        let halfmer: Vec<u8> = (0..PARTIAL_WIN).map(|_| rng.base()).collect();
        fwd.insert(&halfmer, key as u32).unwrap();
        let halfmer: Vec<u8> = (0..PARTIAL_WIN).map(|_| rng.base()).collect();
        rev.insert(&halfmer, key as u32).unwrap();
    }
    IndexPart {
        meta: IndexPartMeta {
            start_part: 0,
            end_part: 0,
            numseq_part: 0,
            seed_len: SEED_LEN,
            partial_win: PARTIAL_WIN,
        },
        lev: LevTable::generate(),
        trie_fwd: fwd.build(),
        trie_rev: rev.build(),
        positions: LmerPositions::empty(),
    }
}

fn bench_enumerate(c: &mut Criterion) {
    let part = build_part(4096);
    let mut rng = XorShift(0xdead_beef_cafe_f00d);
    let reads: Vec<Vec<u8>> = (0..64)
        .map(|_| (0..150).map(|_| rng.base()).collect())
        .collect();
    let cancel = AtomicBool::new(false);

    c.bench_function("enumerate_150bp_reads", |b| {
        b.iter(|| {
            let enumerator = SeedEnumerator::new(&part, false, &cancel);
            let mut total = 0usize;
            for read in &reads {
                total += enumerator.enumerate(black_box(read)).unwrap().len();
            }
            black_box(total)
        })
    });

    c.bench_function("enumerate_with_exact_half_skip", |b| {
        b.iter(|| {
            let enumerator = SeedEnumerator::new(&part, true, &cancel);
            let mut total = 0usize;
            for read in &reads {
                total += enumerator.enumerate(black_box(read)).unwrap().len();
            }
            black_box(total)
        })
    });
}

criterion_group!(benches, bench_enumerate);
criterion_main!(benches);
