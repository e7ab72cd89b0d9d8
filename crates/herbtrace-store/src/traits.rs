use crate::batch::{CommitBatch, Versioned};
use crate::error::StoreResult;

/// Per-key state storage as seen by ledger logic.
///
/// Implementations must be thread-safe and must make every committed value
/// visible to subsequent reads of the same key.
pub trait KeyedStore: Send + Sync {
    /// Read the value under `key`. Returns `Ok(None)` if absent.
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Write (create or replace) the value under `key`.
    fn put(&self, key: &str, value: &[u8]) -> StoreResult<()>;

    /// All entries whose key starts with `prefix`, ordered by key.
    ///
    /// Pass `""` to list every entry.
    fn scan(&self, prefix: &str) -> StoreResult<Vec<(String, Vec<u8>)>>;

    /// `true` if `key` holds a non-empty value.
    fn contains(&self, key: &str) -> StoreResult<bool> {
        Ok(self.get(key)?.is_some_and(|value| !value.is_empty()))
    }
}

/// Storage with per-key versions and atomic, validated batch commits.
///
/// This is the surface the commit layer uses; ledger logic only ever sees
/// [`KeyedStore`].
pub trait VersionedStore: KeyedStore {
    /// Read the value and version under `key`.
    fn get_versioned(&self, key: &str) -> StoreResult<Option<Versioned>>;

    /// Current version of `key`; 0 if it was never written.
    fn version(&self, key: &str) -> StoreResult<u64> {
        Ok(self.get_versioned(key)?.map_or(0, |v| v.version))
    }

    /// Validate the batch's read versions and apply its writes, all or
    /// nothing. Fails with `StoreError::VersionConflict` if any read key
    /// has moved.
    fn commit(&self, batch: &CommitBatch) -> StoreResult<()>;
}
