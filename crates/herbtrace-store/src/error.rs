use std::path::PathBuf;

/// Errors from keyed store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A key read during the transaction was committed by someone else
    /// before this transaction could commit.
    #[error("version conflict on key {key}: read version {expected}, current version {found}")]
    VersionConflict {
        key: String,
        expected: u64,
        found: u64,
    },

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A commit log frame failed validation in the middle of the log.
    #[error("corrupt commit log {path} at offset {offset}: {reason}")]
    CorruptLog {
        path: PathBuf,
        offset: u64,
        reason: String,
    },

    /// An internal lock was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    LockPoisoned,
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
