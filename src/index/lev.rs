//! Universal Levenshtein automaton (k = 1) transition table.
//!
//! The automaton decides, together with the per-window bit table, whether a
//! trie path stays within edit distance 1 of the read's half-mer. It is
//! *universal*: transitions depend only on a 4-bit characteristic mask (which
//! pattern positions around the cursor match the consumed character), never
//! on the characters themselves.
//!
//! States are canonical subsumption-reduced subsets of the distance-1 NFA
//! positions, written as `(offset, errors)` relative to the number of
//! consumed characters:
//!
//! * `(0, 0)`: matched everything so far (the initial state; also the only
//!   state a zero-edit path can be in),
//! * `(0, 1)`: one substitution taken,
//! * `(-1, 1)`: one insertion taken (pattern cursor trails the input),
//! * `(+1, 1)`: one deletion taken (pattern cursor leads the input).
//!
//! A set containing `(0, 0)` subsumes every error-1 position, so only eight
//! state classes are reachable. The on-disk blob keeps a 14-slot state axis
//! and four per-nucleotide lanes; the surplus slots are permanently REJECT
//! and the four lanes hold identical transitions (the mask already encodes
//! the consumed character).

use crate::error::{FilterError, Result};

/// Sentinel returned when the automaton has no surviving position.
pub const REJECT: u8 = 0xFF;

/// State slots in the table (and in the on-disk blob).
pub const NUM_STATES: u8 = 14;

/// Number of reachable states; slots beyond this always transition to REJECT.
pub const NUM_LIVE_STATES: u8 = 8;

/// The initial state `{(0,0)}`. A path is exact iff the automaton is still
/// in this state when the bucket is reached.
pub const START_STATE: u8 = 0;

/// Size of the serialized table: 4 lanes x 16 masks x 14 states.
pub const BLOB_LEN: usize = 4 * 16 * NUM_STATES as usize;

// Position bits inside a state set.
const POS_EXACT: u8 = 0b0001; // (0, 0)
const POS_INS: u8 = 0b0010; // (-1, 1)
const POS_SUB: u8 = 0b0100; // (0, 1)
const POS_DEL: u8 = 0b1000; // (+1, 1)

// Characteristic-mask bits consulted by each position. Bit 3 of the mask is
// the pattern position one behind the cursor, bit 2 the cursor itself, bit 1
// one ahead (bit 0, two ahead, is the entry stage of the shift pipeline and
// is never consulted).
const MASK_BEHIND: u8 = 0b1000;
const MASK_AT: u8 = 0b0100;
const MASK_AHEAD: u8 = 0b0010;

/// The eight reachable state sets, in discovery order from the start state.
const STATE_SETS: [u8; NUM_LIVE_STATES as usize] = [
    POS_EXACT,
    POS_INS | POS_SUB,
    POS_INS | POS_SUB | POS_DEL,
    POS_INS,
    POS_SUB,
    POS_DEL,
    POS_INS | POS_DEL,
    POS_SUB | POS_DEL,
];

/// One transition of the subset machine.
fn step_set(set: u8, mask: u8) -> u8 {
    if set & POS_EXACT != 0 {
        // A match keeps (0,0), which subsumes everything else.
        if mask & MASK_AT != 0 {
            return POS_EXACT;
        }
        // Mismatch: substitution and insertion are always available; a
        // deletion survives only if the next pattern position matches.
        let mut out = POS_INS | POS_SUB;
        if mask & MASK_AHEAD != 0 {
            out |= POS_DEL;
        }
        return out;
    }
    // Error budget exhausted: every position must match its own lane.
    let mut out = 0;
    if set & POS_INS != 0 && mask & MASK_BEHIND != 0 {
        out |= POS_INS;
    }
    if set & POS_SUB != 0 && mask & MASK_AT != 0 {
        out |= POS_SUB;
    }
    if set & POS_DEL != 0 && mask & MASK_AHEAD != 0 {
        out |= POS_DEL;
    }
    out
}

fn set_to_state(set: u8) -> u8 {
    if set == 0 {
        return REJECT;
    }
    STATE_SETS
        .iter()
        .position(|&s| s == set)
        .map(|i| i as u8)
        .unwrap_or(REJECT)
}

/// k = 1 universal Levenshtein transition table.
#[derive(Debug)]
pub struct LevTable {
    table: [[[u8; NUM_STATES as usize]; 16]; 4],
    accepting: [bool; NUM_STATES as usize],
}

impl LevTable {
    /// Generate the table. Deterministic; the result is byte-identical to
    /// the blob shipped inside index parts.
    pub fn generate() -> Self {
        let mut table = [[[REJECT; NUM_STATES as usize]; 16]; 4];
        for lane in 0..4 {
            for mask in 0..16u8 {
                for state in 0..NUM_LIVE_STATES {
                    let next = step_set(STATE_SETS[state as usize], mask);
                    table[lane][mask as usize][state as usize] = set_to_state(next);
                }
            }
        }
        let mut accepting = [false; NUM_STATES as usize];
        for state in 0..NUM_LIVE_STATES {
            // At the end of a depth-P path the surviving alignments are the
            // equal-length ones: zero edits or one substitution.
            let set = STATE_SETS[state as usize];
            accepting[state as usize] = set & (POS_EXACT | POS_SUB) != 0;
        }
        LevTable { table, accepting }
    }

    /// Next state for consumed character `c` under characteristic `mask`.
    #[inline]
    pub fn next_state(&self, c: u8, mask: u8, state: u8) -> u8 {
        debug_assert!(c < 4);
        debug_assert!(state < NUM_STATES);
        self.table[c as usize][(mask & 0x0F) as usize][state as usize]
    }

    /// Whether a depth-P path ending in `state` is within edit distance 1.
    #[inline]
    pub fn is_accepting(&self, state: u8) -> bool {
        state < NUM_STATES && self.accepting[state as usize]
    }

    /// Serialize to the 896-byte index blob.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(BLOB_LEN);
        for lane in &self.table {
            for masks in lane {
                buf.extend_from_slice(masks);
            }
        }
        buf
    }

    /// Load from an index blob, validating dimensions and entry ranges.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != BLOB_LEN {
            return Err(FilterError::corrupt(format!(
                "Levenshtein table blob is {} bytes, expected {}",
                bytes.len(),
                BLOB_LEN
            )));
        }
        let mut out = Self::generate();
        let mut i = 0;
        for lane in out.table.iter_mut() {
            for masks in lane.iter_mut() {
                for slot in masks.iter_mut() {
                    let v = bytes[i];
                    if v != REJECT && v >= NUM_STATES {
                        return Err(FilterError::corrupt(format!(
                            "Levenshtein table entry {} out of range: {:#x}",
                            i, v
                        )));
                    }
                    *slot = v;
                    i += 1;
                }
            }
        }
        Ok(out)
    }
}

impl Default for LevTable {
    fn default() -> Self {
        Self::generate()
    }
}
