use herbtrace_store::StoreError;
use herbtrace_types::TypeError;

/// Errors produced by ledger operations.
///
/// Every error is terminal for the transaction that raised it: nothing the
/// transaction wrote is committed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("unauthorized: only {required} may {action}; caller is {caller}")]
    Unauthorized {
        action: String,
        required: String,
        caller: String,
    },

    #[error("the batch {0} already exists")]
    AlreadyExists(String),

    #[error("the batch {0} does not exist")]
    NotFound(String),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("invalid batch id {0:?}")]
    InvalidBatchId(String),

    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    #[error("transaction conflict: {0}")]
    Conflict(String),

    #[error("transaction time cannot be resolved: {0}")]
    Timestamp(TypeError),

    #[error("stored history for {key} is unreadable: {reason}")]
    CorruptHistory { key: String, reason: String },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("store error: {0}")]
    Store(String),
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::VersionConflict { .. } => Self::Conflict(err.to_string()),
            other => Self::Store(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_conflicts_become_ledger_conflicts() {
        let err = LedgerError::from(StoreError::VersionConflict {
            key: "B1".into(),
            expected: 1,
            found: 2,
        });
        assert!(matches!(err, LedgerError::Conflict(_)));
        assert!(matches!(
            LedgerError::from(StoreError::LockPoisoned),
            LedgerError::Store(_)
        ));
    }

    #[test]
    fn messages_name_the_batch() {
        assert_eq!(
            LedgerError::AlreadyExists("B1".into()).to_string(),
            "the batch B1 already exists"
        );
        assert_eq!(
            LedgerError::NotFound("B2".into()).to_string(),
            "the batch B2 does not exist"
        );
    }
}
