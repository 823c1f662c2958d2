//! `stockbook-ledger` — append-only stock-movement ledger.
//!
//! The ledger is the single source of truth: every accepted stock movement
//! becomes an immutable, globally sequenced [`StockEntry`]. Aggregates are
//! derived caches, rebuildable at any time via [`LedgerStore::replay`].
//! Corrections are modeled as new adjustment entries, never as edits.

pub mod entry;
pub mod store;

pub use entry::{EntryCandidate, MovementKind, StockEntry};
pub use store::{InMemoryLedger, LedgerError, LedgerStore};
