//! Keyed state storage for the herbal batch provenance ledger.
//!
//! The ledger keeps one value per batch key: the JSON-encoded event history.
//! This crate supplies the storage side of that contract, modelled on a
//! replicated commit log with per-key last-writer-wins state.
//!
//! # Storage Backends
//!
//! All backends implement [`KeyedStore`] and [`VersionedStore`]:
//!
//! - [`InMemoryKeyedStore`] -- `BTreeMap`-based store for tests and embedding
//! - [`CommitLogStore`] -- append-only, CRC-framed commit log replayed on open
//!
//! # Design Rules
//!
//! 1. The store never interprets values -- it is a pure key-value store.
//! 2. Every committed write bumps the key's version by one.
//! 3. A [`CommitBatch`] is applied all-or-nothing, after its read versions
//!    are checked against the current state.
//! 4. Scans are ordered by key.
//! 5. All I/O errors are propagated, never silently ignored.

pub mod batch;
pub mod error;
pub mod log;
pub mod memory;
pub mod traits;

pub use batch::{CommitBatch, Versioned};
pub use error::{StoreError, StoreResult};
pub use log::{CommitLogStore, LogConfig, SyncMode};
pub use memory::InMemoryKeyedStore;
pub use traits::{KeyedStore, VersionedStore};
