//! Error types for the filtering pipeline.
//!
//! Library code propagates errors to the orchestrator; only the binary is
//! allowed to abort the process. Short reads and ambiguous windows are not
//! errors: they are recovered locally by the enumerator and counted in the
//! statistics.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FilterError {
    /// The on-disk index (or a persisted binary record) is inconsistent with
    /// its own headers. Fatal for the index part being loaded.
    #[error("corrupt index: {0}")]
    CorruptIndex(String),

    /// Invalid run configuration (rejected before any work starts).
    #[error("invalid option: {0}")]
    InvalidOption(String),

    /// Cooperative cancellation was requested; partial results are dropped.
    #[error("cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FilterError>;

impl FilterError {
    /// Shorthand for index-consistency failures.
    pub fn corrupt(msg: impl Into<String>) -> Self {
        FilterError::CorruptIndex(msg.into())
    }
}
