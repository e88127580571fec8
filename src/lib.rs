pub mod align_record;
pub mod defaults;
pub mod error;
pub mod index; // Index loading (Levenshtein table, burst tries, references)
pub mod io; // Query reads ingestion (FASTA/FASTQ, gzip/BGZF)
pub mod nt;
pub mod opts;
pub mod pipeline; // Per-part orchestration and the scorer seam
pub mod search; // Seed-and-extend candidate generation
pub mod stats;
pub mod utils;

pub use error::{FilterError, Result};
pub use opts::FilterOpt;
pub use search::seed::SeedHit;
