use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockbook_core::{CorrelationId, ProductId, WarehouseId};

/// Kind of stock movement recorded in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    Receipt,
    Issue,
    TransferOut,
    TransferIn,
    Adjustment,
}

impl MovementKind {
    /// Stable name for logs and persisted payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::Receipt => "receipt",
            MovementKind::Issue => "issue",
            MovementKind::TransferOut => "transfer_out",
            MovementKind::TransferIn => "transfer_in",
            MovementKind::Adjustment => "adjustment",
        }
    }

    /// Sign discipline for the quantity delta of this kind.
    ///
    /// Receipts and transfer-ins add stock, issues and transfer-outs remove
    /// it; adjustments may go either way but never carry a zero delta.
    pub fn delta_is_valid(&self, delta: i64) -> bool {
        match self {
            MovementKind::Receipt | MovementKind::TransferIn => delta > 0,
            MovementKind::Issue | MovementKind::TransferOut => delta < 0,
            MovementKind::Adjustment => delta != 0,
        }
    }
}

impl core::fmt::Display for MovementKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A committed ledger record. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockEntry {
    /// Global, strictly increasing, gap-free sequence number (starts at 1).
    pub sequence: u64,
    pub recorded_at: DateTime<Utc>,
    pub product: ProductId,
    pub warehouse: WarehouseId,
    /// Signed quantity delta; sign must match `kind`.
    pub delta: i64,
    pub kind: MovementKind,
    /// Links related entries: the two legs of a transfer (and any
    /// compensation), or a hold and its committed issue.
    pub correlation: Option<CorrelationId>,
    pub actor: Option<String>,
    pub reason: Option<String>,
}

/// An unsequenced movement submitted for append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryCandidate {
    pub occurred_at: DateTime<Utc>,
    pub product: ProductId,
    pub warehouse: WarehouseId,
    pub delta: i64,
    pub kind: MovementKind,
    pub correlation: Option<CorrelationId>,
    pub actor: Option<String>,
    pub reason: Option<String>,
}

impl EntryCandidate {
    pub fn new(product: ProductId, warehouse: WarehouseId, delta: i64, kind: MovementKind) -> Self {
        Self {
            occurred_at: Utc::now(),
            product,
            warehouse,
            delta,
            kind,
            correlation: None,
            actor: None,
            reason: None,
        }
    }

    /// A receipt of `quantity` units (positive delta).
    pub fn receipt(product: ProductId, warehouse: WarehouseId, quantity: i64) -> Self {
        Self::new(product, warehouse, quantity, MovementKind::Receipt)
    }

    /// An issue of `quantity` units (negative delta).
    pub fn issue(product: ProductId, warehouse: WarehouseId, quantity: i64) -> Self {
        Self::new(product, warehouse, -quantity, MovementKind::Issue)
    }

    /// The debit leg of a transfer (negative delta at the source).
    pub fn transfer_out(product: ProductId, warehouse: WarehouseId, quantity: i64) -> Self {
        Self::new(product, warehouse, -quantity, MovementKind::TransferOut)
    }

    /// The credit leg of a transfer (positive delta at the destination).
    pub fn transfer_in(product: ProductId, warehouse: WarehouseId, quantity: i64) -> Self {
        Self::new(product, warehouse, quantity, MovementKind::TransferIn)
    }

    /// A signed correction.
    pub fn adjustment(product: ProductId, warehouse: WarehouseId, delta: i64) -> Self {
        Self::new(product, warehouse, delta, MovementKind::Adjustment)
    }

    pub fn with_correlation(mut self, correlation: CorrelationId) -> Self {
        self.correlation = Some(correlation);
        self
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}
