use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid batch id {0:?}: must be non-empty and free of surrounding whitespace")]
    InvalidBatchId(String),

    #[error("unknown event type: {0}")]
    UnknownEventKind(String),

    #[error("transaction time out of range: {0} seconds since epoch")]
    TimestampOutOfRange(i128),

    #[error("invalid ISO-8601 timestamp {value:?}: {reason}")]
    InvalidTimestamp { value: String, reason: String },
}
