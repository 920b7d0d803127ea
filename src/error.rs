//! Error types for the kwix index.

use thiserror::Error;

/// Result type alias using [`IndexError`].
pub type Result<T> = std::result::Result<T, IndexError>;

/// Errors that can occur in index operations.
#[derive(Debug, Error)]
pub enum IndexError {
    /// An argument was rejected before any state was touched
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The active overlay reached the hard limit. Rebuilds are not keeping
    /// up with the write volume, so answering would hide unindexed data.
    #[error(
        "Index overloaded: overlay holds {overlay_len} entries, hard limit is {hard_limit}"
    )]
    Overloaded {
        overlay_len: usize,
        hard_limit: usize,
    },

    #[error("Corpus too large: {len} code points (max {max})")]
    CorpusTooLarge { len: usize, max: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Scheduler error: {0}")]
    Scheduler(String),
}

impl IndexError {
    /// Whether this error is the overload signal from a read
    pub fn is_overloaded(&self) -> bool {
        matches!(self, IndexError::Overloaded { .. })
    }
}
