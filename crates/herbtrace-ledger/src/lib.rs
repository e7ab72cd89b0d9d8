//! Batch provenance ledger for herbal products.
//!
//! A batch moves through collection, processing, and quality testing; each
//! custody stage appends one event to the batch's history. This crate holds
//! the rules for those appends and everything derived from them:
//!
//! - [`TraceContract`]: the state machine deciding who may append what, and
//!   computing the next history
//! - [`TransactionContext`]: the capability the state machine runs against
//!   (caller credential, agreed transaction time, keyed store)
//! - [`LocalChain`]: a single-node commit layer that runs transactions with
//!   read-set validation and atomic commits
//! - Projection builders (processing/testing dashboards, consumer provenance)
//! - History validation against the ledger invariants

pub mod chain;
pub mod config;
pub mod context;
pub mod contract;
pub mod error;
pub mod projection;
pub mod records;
pub mod validation;

pub use chain::{LocalChain, ManualTxClock, SystemTxClock, Transaction, TxClock};
pub use config::OrgTopology;
pub use context::TransactionContext;
pub use contract::{Operation, TraceContract};
pub use error::LedgerError;
pub use projection::{
    DetailLine, GeoPoint, MapMarker, PendingProcessing, PendingTesting, ProjectionBuilder,
    ProvenanceEntry, ProvenanceView,
};
pub use records::{
    BatchRecord, CollectionDetails, Event, EventDetails, Extensions, ProcessingDetails,
    QualityDetails,
};
pub use validation::{HistoryValidator, ValidationReport, Violation, ViolationKind};
