use serde::{Deserialize, Serialize};

/// A stored value together with its per-key version.
///
/// Versions start at 1 for the first write; an absent key has version 0.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Versioned {
    pub value: Vec<u8>,
    pub version: u64,
}

/// The effects of one transaction, applied atomically at commit.
///
/// `reads` records the version of every key the transaction observed.
/// The batch only commits if none of those keys moved in the meantime.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitBatch {
    pub reads: Vec<(String, u64)>,
    pub writes: Vec<(String, Vec<u8>)>,
}

impl CommitBatch {
    /// A blind write of one key, with no read dependencies.
    pub fn single(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            reads: Vec::new(),
            writes: vec![(key.into(), value.into())],
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.writes.is_empty()
    }
}
