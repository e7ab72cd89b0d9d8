use herbtrace_store::KeyedStore;
use herbtrace_types::TxTimestamp;

/// Everything the host gives the state machine for one transaction.
///
/// The state machine never reads a wall clock and never learns who the
/// caller is beyond their organization: both come from the commit layer
/// through this trait, so every replica executing the same transaction
/// derives the same result.
pub trait TransactionContext {
    /// Organizational credential of the caller, e.g. `Org1MSP`.
    fn caller_credential(&self) -> &str;

    /// Agreed transaction time, in whatever shape the commit layer uses.
    fn transaction_time(&self) -> TxTimestamp;

    /// State visible to this transaction. Writes become durable only when
    /// the transaction commits.
    fn store(&self) -> &dyn KeyedStore;
}
