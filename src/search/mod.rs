//! The seed-and-extend candidate generator: per-window bit tables, the
//! automaton-guided trie traversal, and the per-read sliding-window driver.

pub mod seed;
pub mod traverse;
pub mod window;
