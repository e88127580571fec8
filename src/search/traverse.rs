//! Parallel traversal of a mini burst trie under the Levenshtein automaton.
//!
//! Starting at the trie root with the automaton in its initial state, the
//! walk visits children in nucleotide order `A, C, G, T`. Each edge consumes
//! one character: the 4-bit characteristic mask for that character at the
//! current depth comes from the window bit table, the automaton steps through
//! the transition table, and REJECT prunes the subtree. Reaching a bucket
//! means a full depth-P path was consumed; its keys are emitted iff the
//! automaton is in an accepting state, i.e. the path is within edit distance
//! 1 of the half-mer. A bucket reached in the start state is an exact match
//! and raises `accept_zero_kmer`.

use crate::index::lev::{LevTable, REJECT, START_STATE};
use crate::index::trie::{Child, MiniBurstTrie};
use crate::search::seed::SeedHit;
use crate::search::window::WindowBitTable;

/// Borrowed state for one half-trie traversal at one window position.
pub struct Traversal<'a> {
    pub trie: &'a MiniBurstTrie,
    pub lev: &'a LevTable,
    pub table: &'a WindowBitTable,
    /// Window number on the read, tagged into every emitted hit.
    pub win_num: u32,
    /// Read strand being searched.
    pub forward: bool,
}

impl<'a> Traversal<'a> {
    /// Enumerate every bucket within edit distance 1 of the half-mer the
    /// bit table was built from. Appends hits in deterministic order
    /// (nucleotide order at every level, storage order inside buckets).
    pub fn run(&self, hits: &mut Vec<SeedHit>, accept_zero_kmer: &mut bool) {
        if self.trie.is_empty() {
            return;
        }
        self.walk(self.trie.root(), START_STATE, 0, hits, accept_zero_kmer);
    }

    fn walk(
        &self,
        node: u32,
        state: u8,
        depth: usize,
        hits: &mut Vec<SeedHit>,
        accept_zero_kmer: &mut bool,
    ) {
        for c in 0..4u8 {
            let child = self.trie.child(node, c);
            if child == Child::Empty {
                continue;
            }
            let mask = self.table.mask(depth, c);
            let next = self.lev.next_state(c, mask, state);
            if next == REJECT {
                continue;
            }
            match child {
                Child::Node(n) => self.walk(n, next, depth + 1, hits, accept_zero_kmer),
                Child::Bucket(b) => {
                    // Non-REJECT at an interior depth only means "still
                    // viable"; the bucket decides on the accepting set.
                    if !self.lev.is_accepting(next) {
                        continue;
                    }
                    let keys = self.trie.bucket_keys(b);
                    if keys.is_empty() {
                        continue;
                    }
                    for &key in keys {
                        hits.push(SeedHit {
                            trie_key: key,
                            window: self.win_num,
                            forward: self.forward,
                        });
                    }
                    if next == START_STATE {
                        *accept_zero_kmer = true;
                    }
                }
                Child::Empty => unreachable!(),
            }
        }
    }
}
