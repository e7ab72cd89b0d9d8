//! Foundation types for the herbal batch provenance ledger.
//!
//! This crate provides the identity, classification, and temporal types
//! shared by every other `herbtrace` crate.
//!
//! # Key Types
//!
//! - [`BatchId`] -- Opaque key a batch history is stored under
//! - [`EventKind`] -- Custody stage of one event (`collection`, `processing`, `quality`)
//! - [`OrgId`] -- Organizational credential presented by a caller
//! - [`TxTimestamp`] -- Transaction time as handed over by the commit log, in any of its shapes
//! - [`CommitInstant`] -- The canonical instant a transaction time resolves to

pub mod batch;
pub mod error;
pub mod kind;
pub mod org;
pub mod temporal;

pub use batch::BatchId;
pub use error::TypeError;
pub use kind::EventKind;
pub use org::OrgId;
pub use temporal::{CommitInstant, EpochSeconds, TxTimestamp};
