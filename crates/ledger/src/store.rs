use std::sync::RwLock;

use thiserror::Error;
use tracing::debug;

use stockbook_core::{InventoryError, ProductId, WarehouseId};

use crate::entry::{EntryCandidate, StockEntry};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The candidate violates the record shape (zero delta, sign/kind
    /// mismatch). Business rules are checked upstream; this is the store's
    /// own guard against malformed records.
    #[error("invalid entry: {0}")]
    InvalidEntry(String),

    /// The backing store failed the append or read.
    #[error("ledger backend failure: {0}")]
    Backend(String),
}

impl From<LedgerError> for InventoryError {
    fn from(err: LedgerError) -> Self {
        InventoryError::ledger_write(err.to_string())
    }
}

/// Append-only store of stock movements.
///
/// Implementations must assign the next sequence number atomically with the
/// append: no two callers may observe the same "next sequence", and the
/// committed ledger is gap-free. Entries are never mutated or deleted.
///
/// The concrete storage medium is an external collaborator; the in-memory
/// implementation below is the shipped one, and the trait is the seam a
/// durable store plugs into.
pub trait LedgerStore: Send + Sync {
    /// Sequence and commit a candidate movement.
    fn append(&self, candidate: EntryCandidate) -> Result<StockEntry, LedgerError>;

    /// All entries with `sequence >= from_sequence`, in sequence order.
    /// Used to rebuild aggregates (e.g. after a crash).
    fn replay(&self, from_sequence: u64) -> Result<Vec<StockEntry>, LedgerError>;

    /// Sequence number of the latest committed entry (0 when empty).
    fn head_sequence(&self) -> Result<u64, LedgerError>;

    /// Movement history for one (product, warehouse) key, oldest first.
    fn movements(
        &self,
        product: ProductId,
        warehouse: WarehouseId,
        since_sequence: u64,
    ) -> Result<Vec<StockEntry>, LedgerError> {
        let entries = self.replay(since_sequence)?;
        Ok(entries
            .into_iter()
            .filter(|e| e.product == product && e.warehouse == warehouse)
            .collect())
    }
}

/// In-memory append-only ledger.
///
/// The single `RwLock` gives snapshot isolation: a reader sees the ledger
/// before or after an append, never a partial record. The next sequence is
/// derived under the write lock (`len + 1`), which keeps the committed
/// ledger gap-free even when an append is rejected.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    entries: RwLock<Vec<StockEntry>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LedgerStore for InMemoryLedger {
    fn append(&self, candidate: EntryCandidate) -> Result<StockEntry, LedgerError> {
        if !candidate.kind.delta_is_valid(candidate.delta) {
            return Err(LedgerError::InvalidEntry(format!(
                "delta {} invalid for movement kind '{}'",
                candidate.delta, candidate.kind
            )));
        }

        let mut entries = self
            .entries
            .write()
            .map_err(|_| LedgerError::Backend("lock poisoned".to_string()))?;

        let sequence = entries.len() as u64 + 1;
        let entry = StockEntry {
            sequence,
            recorded_at: candidate.occurred_at,
            product: candidate.product,
            warehouse: candidate.warehouse,
            delta: candidate.delta,
            kind: candidate.kind,
            correlation: candidate.correlation,
            actor: candidate.actor,
            reason: candidate.reason,
        };
        entries.push(entry.clone());

        debug!(
            sequence,
            kind = entry.kind.as_str(),
            product = %entry.product,
            warehouse = %entry.warehouse,
            delta = entry.delta,
            "ledger append"
        );

        Ok(entry)
    }

    fn replay(&self, from_sequence: u64) -> Result<Vec<StockEntry>, LedgerError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| LedgerError::Backend("lock poisoned".to_string()))?;

        // Gap-free sequences start at 1, so sequence n sits at index n - 1.
        let start = from_sequence.saturating_sub(1) as usize;
        Ok(entries.get(start..).unwrap_or_default().to_vec())
    }

    fn head_sequence(&self) -> Result<u64, LedgerError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| LedgerError::Backend("lock poisoned".to_string()))?;
        Ok(entries.len() as u64)
    }
}
