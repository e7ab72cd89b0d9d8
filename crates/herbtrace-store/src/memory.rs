use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::batch::{CommitBatch, Versioned};
use crate::error::{StoreError, StoreResult};
use crate::traits::{KeyedStore, VersionedStore};

/// In-memory, `BTreeMap`-based keyed store.
///
/// Intended for tests and embedding. All entries are held behind a
/// `RwLock`; values are cloned on read and write.
#[derive(Default)]
pub struct InMemoryKeyedStore {
    entries: RwLock<BTreeMap<String, Versioned>>,
}

impl InMemoryKeyedStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> StoreResult<usize> {
        Ok(self.read_guard()?.len())
    }

    /// Returns `true` if the store holds no keys.
    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.read_guard()?.is_empty())
    }

    /// Check the batch's read versions without applying anything.
    pub(crate) fn validate(&self, batch: &CommitBatch) -> StoreResult<()> {
        let entries = self.read_guard()?;
        check_reads(&entries, batch)
    }

    /// Apply the batch's writes without validating reads.
    ///
    /// Callers must already hold whatever serializes commits.
    pub(crate) fn apply(&self, batch: &CommitBatch) -> StoreResult<()> {
        let mut entries = self.write_guard()?;
        apply_writes(&mut entries, batch);
        Ok(())
    }

    fn read_guard(&self) -> StoreResult<RwLockReadGuard<'_, BTreeMap<String, Versioned>>> {
        self.entries.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn write_guard(&self) -> StoreResult<RwLockWriteGuard<'_, BTreeMap<String, Versioned>>> {
        self.entries.write().map_err(|_| StoreError::LockPoisoned)
    }
}

fn check_reads(entries: &BTreeMap<String, Versioned>, batch: &CommitBatch) -> StoreResult<()> {
    for (key, expected) in &batch.reads {
        let found = entries.get(key).map_or(0, |v| v.version);
        if found != *expected {
            return Err(StoreError::VersionConflict {
                key: key.clone(),
                expected: *expected,
                found,
            });
        }
    }
    Ok(())
}

fn apply_writes(entries: &mut BTreeMap<String, Versioned>, batch: &CommitBatch) {
    for (key, value) in &batch.writes {
        let version = entries.get(key).map_or(0, |v| v.version) + 1;
        entries.insert(
            key.clone(),
            Versioned {
                value: value.clone(),
                version,
            },
        );
    }
}

impl KeyedStore for InMemoryKeyedStore {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.read_guard()?.get(key).map(|v| v.value.clone()))
    }

    fn put(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        self.commit(&CommitBatch::single(key, value))
    }

    fn scan(&self, prefix: &str) -> StoreResult<Vec<(String, Vec<u8>)>> {
        let entries = self.read_guard()?;
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, v)| (key.clone(), v.value.clone()))
            .collect())
    }
}

impl VersionedStore for InMemoryKeyedStore {
    fn get_versioned(&self, key: &str) -> StoreResult<Option<Versioned>> {
        Ok(self.read_guard()?.get(key).cloned())
    }

    fn commit(&self, batch: &CommitBatch) -> StoreResult<()> {
        let mut entries = self.write_guard()?;
        check_reads(&entries, batch)?;
        apply_writes(&mut entries, batch);
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryKeyedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.entries.read().map(|e| e.len()).unwrap_or_default();
        f.debug_struct("InMemoryKeyedStore")
            .field("key_count", &count)
            .finish()
    }
}
