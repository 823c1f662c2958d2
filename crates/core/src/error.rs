//! Inventory error taxonomy.

use thiserror::Error;

use crate::id::{ProductId, ReservationId, WarehouseId};

/// Result type used across the engine.
pub type InventoryResult<T> = Result<T, InventoryError>;

/// Engine-level error.
///
/// Validation and business-rule variants are returned before any write; a
/// rejected movement never reaches the ledger. Each variant carries the
/// identifiers and quantities involved so callers can log, debug, and retry
/// idempotently.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InventoryError {
    /// The product is not registered in the catalog.
    #[error("unknown product {product}")]
    UnknownProduct { product: ProductId },

    /// The warehouse is not registered in the catalog.
    #[error("unknown warehouse {warehouse}")]
    UnknownWarehouse { warehouse: WarehouseId },

    /// Movements must carry a strictly positive quantity.
    #[error("non-positive quantity {quantity} for product {product} at warehouse {warehouse}")]
    NonPositiveQuantity {
        product: ProductId,
        warehouse: WarehouseId,
        quantity: i64,
    },

    /// The warehouse does not hold enough stock for the movement.
    #[error(
        "insufficient stock for product {product} at warehouse {warehouse}: \
         requested {requested}, available {available}"
    )]
    InsufficientStock {
        product: ProductId,
        warehouse: WarehouseId,
        requested: i64,
        available: i64,
    },

    /// Not enough unreserved stock to place a hold.
    #[error(
        "insufficient available stock for product {product} at warehouse {warehouse}: \
         requested {requested}, available {available}"
    )]
    InsufficientAvailable {
        product: ProductId,
        warehouse: WarehouseId,
        requested: i64,
        available: i64,
    },

    /// A transfer's source and destination must differ.
    #[error("transfer source and destination are both warehouse {warehouse}")]
    SameWarehouse { warehouse: WarehouseId },

    /// Could not acquire the per-key lock within the caller's budget.
    /// Retryable; the caller decides backoff.
    #[error("timed out acquiring stock lock for product {product} at warehouse {warehouse}")]
    LockTimeout {
        product: ProductId,
        warehouse: WarehouseId,
    },

    /// The reservation expired before commit won the key lock.
    #[error("reservation {reservation} expired")]
    ReservationExpired { reservation: ReservationId },

    /// The reservation was already committed.
    #[error("reservation {reservation} already committed")]
    AlreadyCommitted { reservation: ReservationId },

    /// No reservation with this id exists.
    #[error("reservation {reservation} not found")]
    ReservationNotFound { reservation: ReservationId },

    /// A product with this SKU is already registered.
    #[error("duplicate product sku '{sku}'")]
    DuplicateProduct { sku: String },

    /// A warehouse with this code is already registered.
    #[error("duplicate warehouse code '{code}'")]
    DuplicateWarehouse { code: String },

    /// The ledger rejected or failed the append. Fatal for the operation;
    /// the transfer coordinator compensates, everything else surfaces it.
    #[error("ledger write failure: {0}")]
    LedgerWriteFailure(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl InventoryError {
    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn ledger_write(msg: impl Into<String>) -> Self {
        Self::LedgerWriteFailure(msg.into())
    }

    /// Whether the caller may safely retry the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LockTimeout { .. })
    }
}
