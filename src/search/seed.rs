//! Sliding-window seed enumeration for one read.
//!
//! For every window of `L` characters on the read (and again on its reverse
//! complement) the enumerator maintains two bit tables, one patterning the
//! window's P-prefix and one its P-suffix, and runs the automaton-guided
//! trie traversal against the matching half-trie of the index part. Window 0
//! initializes the tables; every further window is an O(P) in-place shift.
//!
//! The suffix half is searched first. When it produces an exact (zero-edit)
//! match the `accept_zero_kmer` flag latches for the rest of this read pass,
//! and with `skip_if_zero_kmer_hit` enabled the prefix half is not searched
//! any more: one exact half already guarantees the window is a seed
//! candidate worth scoring.
//!
//! Windows whose P-prefix or P-suffix contains `N` are skipped silently; the
//! tables still shift across them, so later windows need no rebuild.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{FilterError, Result};
use crate::index::IndexPart;
use crate::nt;
use crate::search::traverse::Traversal;
use crate::search::window::WindowBitTable;

/// One candidate reference L-mer matched to a read window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedHit {
    /// Key into the L-mer occurrence table.
    pub trie_key: u32,
    /// Window number on the read at which the L-mer matched.
    pub window: u32,
    /// True when the hit was found on the forward read, false on the
    /// reverse complement.
    pub forward: bool,
}

/// Per-read driver composing the bit tables and the trie traversal.
pub struct SeedEnumerator<'a> {
    part: &'a IndexPart,
    skip_if_zero_kmer_hit: bool,
    cancel: &'a AtomicBool,
}

impl<'a> SeedEnumerator<'a> {
    pub fn new(part: &'a IndexPart, skip_if_zero_kmer_hit: bool, cancel: &'a AtomicBool) -> Self {
        SeedEnumerator {
            part,
            skip_if_zero_kmer_hit,
            cancel,
        }
    }

    /// Enumerate seed hits for a numeric read: forward strand first, then
    /// its reverse complement. Reads shorter than `L` yield no hits (the
    /// pipeline accounts for them). A raised cancel flag aborts with
    /// [`FilterError::Cancelled`] and no hits.
    pub fn enumerate(&self, read: &[u8]) -> Result<Vec<SeedHit>> {
        let mut hits = Vec::new();
        if read.len() < self.part.meta.seed_len as usize {
            return Ok(hits);
        }
        self.scan_strand(read, true, &mut hits)?;
        let rc = nt::reverse_complement(read);
        self.scan_strand(&rc, false, &mut hits)?;
        Ok(hits)
    }

    fn scan_strand(&self, read: &[u8], forward: bool, hits: &mut Vec<SeedHit>) -> Result<()> {
        let seed_len = self.part.meta.seed_len as usize;
        let partial = self.part.meta.partial_win as usize;
        let last_win = read.len() - seed_len;

        let mut fwd_table = WindowBitTable::new(partial);
        let mut rev_table = WindowBitTable::new(partial);
        let mut accept_zero_kmer = false;
        // The prefix half never drives the early-exit policy; its exact
        // matches land in this scratch flag.
        let mut scratch = false;

        for win in 0..=last_win {
            if self.cancel.load(Ordering::Relaxed) {
                return Err(FilterError::Cancelled);
            }
            if win == 0 {
                fwd_table.init_forward(read, 0);
                rev_table.init_reverse(read, 0, seed_len);
            } else {
                fwd_table.shift_forward(read, win);
                rev_table.shift_reverse(read, win, seed_len);
            }
            if has_ambiguous(&read[win..win + seed_len], partial) {
                continue;
            }

            Traversal {
                trie: &self.part.trie_rev,
                lev: &self.part.lev,
                table: &rev_table,
                win_num: win as u32,
                forward,
            }
            .run(hits, &mut accept_zero_kmer);

            if accept_zero_kmer && self.skip_if_zero_kmer_hit {
                continue;
            }

            Traversal {
                trie: &self.part.trie_fwd,
                lev: &self.part.lev,
                table: &fwd_table,
                win_num: win as u32,
                forward,
            }
            .run(hits, &mut scratch);
        }
        Ok(())
    }
}

/// A window is ambiguous when either half-mer contains `N`.
fn has_ambiguous(window: &[u8], partial: usize) -> bool {
    window[..partial].iter().any(|&c| c >= 4) || window[partial..].iter().any(|&c| c >= 4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::trie::TrieBuilder;
    use crate::index::{IndexPart, IndexPartMeta, LmerPositions};
    use crate::index::lev::LevTable;

    /// Index part with the toy forward trie from the scenario table:
    /// reference 2-prefixes AC and AG, one key each.
    fn toy_part(rev_entries: &[(&[u8], u32)]) -> IndexPart {
        let mut fwd = TrieBuilder::new(2);
        fwd.insert(&nt::encode(b"AC"), 0).unwrap();
        fwd.insert(&nt::encode(b"AG"), 1).unwrap();
        let mut rev = TrieBuilder::new(2);
        for &(halfmer, key) in rev_entries {
            rev.insert(&nt::encode(halfmer), key).unwrap();
        }
        IndexPart {
            meta: IndexPartMeta {
                start_part: 0,
                end_part: 0,
                numseq_part: 0,
                seed_len: 4,
                partial_win: 2,
            },
            lev: LevTable::generate(),
            trie_fwd: fwd.build(),
            trie_rev: rev.build(),
            positions: LmerPositions::empty(),
        }
    }

    fn enumerate(part: &IndexPart, read: &[u8], skip: bool) -> Vec<SeedHit> {
        let cancel = AtomicBool::new(false);
        SeedEnumerator::new(part, skip, &cancel)
            .enumerate(&nt::encode(read))
            .unwrap()
    }

    #[test]
    fn exact_prefix_window() {
        // Forward strand of ACGT hits both AC (exact) and AG (one edit);
        // the reverse complement ACGT is the same string.
        let part = toy_part(&[]);
        let hits = enumerate(&part, b"ACGT", false);
        assert_eq!(
            hits,
            vec![
                SeedHit { trie_key: 0, window: 0, forward: true },
                SeedHit { trie_key: 1, window: 0, forward: true },
                SeedHit { trie_key: 0, window: 0, forward: false },
                SeedHit { trie_key: 1, window: 0, forward: false },
            ]
        );
    }

    #[test]
    fn ambiguous_window_is_skipped() {
        let part = toy_part(&[]);
        // Forward: N in the prefix half. Reverse complement ACGN: N in the
        // suffix half. Both skipped.
        let hits = enumerate(&part, b"NCGT", false);
        assert!(hits.is_empty());
    }

    #[test]
    fn read_shorter_than_seed_yields_nothing() {
        let part = toy_part(&[]);
        let hits = enumerate(&part, b"ACG", false);
        assert!(hits.is_empty());
    }

    #[test]
    fn exact_suffix_skips_prefix_traversal_when_enabled() {
        // Reverse trie holds the reversed suffix half "TG" of ACGT.
        let part = toy_part(&[(b"TG", 42)]);
        let with_skip = enumerate(&part, b"ACGT", true);
        // Forward strand: suffix half matches exactly -> prefix half (AC,
        // AG) suppressed. Reverse-complement strand: suffix "GT" reversed is
        // "TG"... also exact, prefix suppressed again.
        assert_eq!(
            with_skip,
            vec![
                SeedHit { trie_key: 42, window: 0, forward: true },
                SeedHit { trie_key: 42, window: 0, forward: false },
            ]
        );
        let without_skip = enumerate(&part, b"ACGT", false);
        assert_eq!(without_skip.len(), 6);
        // Suffix-half hits come first within the window.
        assert_eq!(without_skip[0].trie_key, 42);
    }

    #[test]
    fn cancelled_read_produces_no_hits() {
        let part = toy_part(&[]);
        let cancel = AtomicBool::new(true);
        let e = SeedEnumerator::new(&part, false, &cancel);
        match e.enumerate(&nt::encode(b"ACGT")) {
            Err(FilterError::Cancelled) => {}
            other => panic!("expected Cancelled, got {:?}", other.map(|v| v.len())),
        }
    }
}
