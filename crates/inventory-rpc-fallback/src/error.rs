//! Error types for the fallback store.

use thiserror::Error;

/// Errors reading or writing the fallback record.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record has been saved yet.
    #[error("no fallback record has been saved")]
    Missing,

    /// The record could not be read or written.
    #[error("fallback record I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The record exists but is not valid JSON.
    #[error("fallback record is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

impl StoreError {
    /// Returns `true` if no record exists yet.
    pub fn is_missing(&self) -> bool {
        matches!(self, StoreError::Missing)
    }
}
