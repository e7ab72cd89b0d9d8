use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info};

use herbtrace_store::{CommitBatch, KeyedStore, StoreError, StoreResult, VersionedStore};
use herbtrace_types::{EpochSeconds, TxTimestamp};

use crate::context::TransactionContext;
use crate::contract::{Operation, TraceContract};
use crate::error::LedgerError;
use crate::records::{BatchRecord, Event};

/// Source of agreed transaction times.
pub trait TxClock: Send + Sync {
    /// Timestamp for the next transaction.
    fn next(&self) -> TxTimestamp;
}

/// Wall-clock transaction times, never running backwards.
///
/// If the wall clock steps back, the last issued second is reused so that
/// histories stay ordered.
#[derive(Debug, Default)]
pub struct SystemTxClock {
    last_seconds: Mutex<i64>,
}

impl SystemTxClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TxClock for SystemTxClock {
    fn next(&self) -> TxTimestamp {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let wall = i64::try_from(now.as_secs()).unwrap_or(i64::MAX);

        let mut last = self
            .last_seconds
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let (seconds, nanos) = if wall >= *last {
            (wall, now.subsec_nanos() as i32)
        } else {
            (*last, 0)
        };
        *last = seconds;

        TxTimestamp::record(EpochSeconds::long(seconds), nanos)
    }
}

/// Hand-driven clock for tests and replays.
#[derive(Debug, Default)]
pub struct ManualTxClock {
    seconds: AtomicI64,
}

impl ManualTxClock {
    pub fn new(seconds: i64) -> Self {
        Self {
            seconds: AtomicI64::new(seconds),
        }
    }

    pub fn set(&self, seconds: i64) {
        self.seconds.store(seconds, Ordering::SeqCst);
    }

    pub fn advance(&self, seconds: i64) {
        self.seconds.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl TxClock for ManualTxClock {
    fn next(&self) -> TxTimestamp {
        TxTimestamp::from_unix_seconds(self.seconds.load(Ordering::SeqCst))
    }
}

/// Transaction-local view of the store: reads go to the committed state and
/// are recorded with their versions; writes are buffered until commit.
struct TxStore<'a> {
    base: &'a dyn VersionedStore,
    reads: Mutex<BTreeMap<String, u64>>,
    writes: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl<'a> TxStore<'a> {
    fn new(base: &'a dyn VersionedStore) -> Self {
        Self {
            base,
            reads: Mutex::new(BTreeMap::new()),
            writes: Mutex::new(BTreeMap::new()),
        }
    }

    fn reads(&self) -> StoreResult<MutexGuard<'_, BTreeMap<String, u64>>> {
        self.reads.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn writes(&self) -> StoreResult<MutexGuard<'_, BTreeMap<String, Vec<u8>>>> {
        self.writes.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Read through to the committed state, remembering the first version
    /// seen for the key.
    fn read_committed(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let current = self.base.get_versioned(key)?;
        let version = current.as_ref().map_or(0, |v| v.version);
        self.reads()?.entry(key.to_string()).or_insert(version);
        Ok(current.map(|v| v.value))
    }

    fn into_batch(self) -> StoreResult<CommitBatch> {
        let reads = self
            .reads
            .into_inner()
            .map_err(|_| StoreError::LockPoisoned)?;
        let writes = self
            .writes
            .into_inner()
            .map_err(|_| StoreError::LockPoisoned)?;
        Ok(CommitBatch {
            reads: reads.into_iter().collect(),
            writes: writes.into_iter().collect(),
        })
    }
}

impl KeyedStore for TxStore<'_> {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        if let Some(pending) = self.writes()?.get(key) {
            return Ok(Some(pending.clone()));
        }
        self.read_committed(key)
    }

    fn put(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        self.writes()?.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn scan(&self, prefix: &str) -> StoreResult<Vec<(String, Vec<u8>)>> {
        let mut merged = BTreeMap::new();
        for (key, _) in self.base.scan(prefix)? {
            if let Some(value) = self.read_committed(&key)? {
                merged.insert(key, value);
            }
        }
        for (key, value) in self.writes()?.iter() {
            if key.starts_with(prefix) {
                merged.insert(key.clone(), value.clone());
            }
        }
        Ok(merged.into_iter().collect())
    }
}

/// One in-flight transaction: caller identity, agreed time, and a buffered
/// view of the store.
pub struct Transaction<'a> {
    id: u64,
    credential: String,
    timestamp: TxTimestamp,
    store: TxStore<'a>,
}

impl Transaction<'_> {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn timestamp(&self) -> TxTimestamp {
        self.timestamp
    }

    /// Read set and write set accumulated so far.
    pub fn into_batch(self) -> Result<CommitBatch, LedgerError> {
        Ok(self.store.into_batch()?)
    }
}

impl TransactionContext for Transaction<'_> {
    fn caller_credential(&self) -> &str {
        &self.credential
    }

    fn transaction_time(&self) -> TxTimestamp {
        self.timestamp
    }

    fn store(&self) -> &dyn KeyedStore {
        &self.store
    }
}

impl std::fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("credential", &self.credential)
            .field("timestamp", &self.timestamp)
            .finish()
    }
}

/// Single-node commit layer for the trace contract.
///
/// Every write runs inside a [`Transaction`] that records the version of
/// each key it read. Commit re-validates those versions and applies the
/// buffered writes atomically, so two transactions racing on the same batch
/// cannot both commit; the loser fails with [`LedgerError::Conflict`] and
/// leaves no trace. A transaction whose contract call fails is dropped
/// without committing anything.
pub struct LocalChain {
    store: Arc<dyn VersionedStore>,
    clock: Arc<dyn TxClock>,
    contract: TraceContract,
    next_tx: AtomicU64,
}

impl LocalChain {
    pub fn new(
        store: Arc<dyn VersionedStore>,
        clock: Arc<dyn TxClock>,
        contract: TraceContract,
    ) -> Self {
        Self {
            store,
            clock,
            contract,
            next_tx: AtomicU64::new(1),
        }
    }

    /// Chain over `store` with the wall clock and default organizations.
    pub fn with_store(store: Arc<dyn VersionedStore>) -> Self {
        Self::new(store, Arc::new(SystemTxClock::new()), TraceContract::default())
    }

    pub fn contract(&self) -> &TraceContract {
        &self.contract
    }

    pub fn store(&self) -> &Arc<dyn VersionedStore> {
        &self.store
    }

    /// Open a transaction on behalf of `credential`, fixing its time.
    pub fn begin(&self, credential: &str) -> Transaction<'_> {
        let id = self.next_tx.fetch_add(1, Ordering::SeqCst);
        let timestamp = self.clock.next();
        debug!(tx = id, credential, ?timestamp, "transaction begin");
        Transaction {
            id,
            credential: credential.to_string(),
            timestamp,
            store: TxStore::new(self.store.as_ref()),
        }
    }

    /// Validate and apply a transaction's effects.
    pub fn commit(&self, tx: Transaction<'_>) -> Result<u64, LedgerError> {
        let id = tx.id;
        let batch = tx.into_batch()?;
        if batch.is_read_only() {
            return Ok(id);
        }
        self.store.commit(&batch).map_err(|err| {
            debug!(tx = id, error = %err, "transaction rejected at commit");
            LedgerError::from(err)
        })?;
        info!(
            tx = id,
            reads = batch.reads.len(),
            writes = batch.writes.len(),
            "transaction committed"
        );
        Ok(id)
    }

    /// Run `f` in a fresh transaction and commit its writes if it succeeds.
    pub fn submit<T, F>(&self, credential: &str, f: F) -> Result<T, LedgerError>
    where
        F: FnOnce(&TraceContract, &Transaction<'_>) -> Result<T, LedgerError>,
    {
        let tx = self.begin(credential);
        let output = f(&self.contract, &tx)?;
        self.commit(tx)?;
        Ok(output)
    }

    /// Run `f` against a transaction that is never committed.
    pub fn evaluate<T, F>(&self, credential: &str, f: F) -> Result<T, LedgerError>
    where
        F: FnOnce(&TraceContract, &Transaction<'_>) -> Result<T, LedgerError>,
    {
        let tx = self.begin(credential);
        f(&self.contract, &tx)
    }

    pub fn create_batch(
        &self,
        credential: &str,
        batch_id: &str,
        payload: &str,
    ) -> Result<Vec<Event>, LedgerError> {
        self.submit(credential, |c, tx| c.create_batch(tx, batch_id, payload))
    }

    pub fn process_batch(
        &self,
        credential: &str,
        batch_id: &str,
        payload: &str,
    ) -> Result<Vec<Event>, LedgerError> {
        self.submit(credential, |c, tx| c.process_batch(tx, batch_id, payload))
    }

    pub fn add_lab_test(
        &self,
        credential: &str,
        batch_id: &str,
        payload: &str,
    ) -> Result<Vec<Event>, LedgerError> {
        self.submit(credential, |c, tx| c.add_lab_test(tx, batch_id, payload))
    }

    /// Stored history JSON for `batch_id`.
    pub fn batch_history(&self, credential: &str, batch_id: &str) -> Result<String, LedgerError> {
        self.evaluate(credential, |c, tx| c.get_batch_history(tx, batch_id))
    }

    pub fn history(&self, credential: &str, batch_id: &str) -> Result<Vec<Event>, LedgerError> {
        self.evaluate(credential, |c, tx| c.history(tx, batch_id))
    }

    pub fn all_batches(&self, credential: &str) -> Result<Vec<BatchRecord>, LedgerError> {
        self.evaluate(credential, |c, tx| c.all_batches(tx))
    }

    /// Run an operation by name: writes are submitted, reads evaluated.
    pub fn invoke(
        &self,
        credential: &str,
        operation: Operation,
        args: &[&str],
    ) -> Result<String, LedgerError> {
        if operation.is_write() {
            self.submit(credential, |c, tx| c.invoke(tx, operation, args))
        } else {
            self.evaluate(credential, |c, tx| c.invoke(tx, operation, args))
        }
    }
}

impl std::fmt::Debug for LocalChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalChain")
            .field("contract", &self.contract)
            .field("next_tx", &self.next_tx.load(Ordering::Relaxed))
            .finish()
    }
}
