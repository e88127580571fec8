// src/defaults.rs

// Seed parameters
pub const SEED_LENGTH: u32 = 18;
pub const MIN_SEED_LENGTH: u32 = 8;

// Batch processing
// Chunk of bases handed to each worker thread per batch.
pub const CHUNK_SIZE_BASES: usize = 10_000_000;
// Assumed average read length for batch size calculation.
pub const AVG_READ_LEN: usize = 125;
// Minimum batch size in reads.
pub const MIN_BATCH_SIZE: usize = 512;
// Bounded depth of the reader -> worker batch channel.
pub const BATCH_CHANNEL_BOUND: usize = 4;

// Other
pub const VERBOSITY: i32 = 3;
pub const INDEX_SUFFIX: &str = "rsvi";
pub const STATS_SUFFIX: &str = "stats";
