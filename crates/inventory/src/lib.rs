//! `stockbook-inventory` — the multi-warehouse inventory engine.
//!
//! Composes the append-only ledger with a derived level book, per-key
//! lock coordination, admission validation, atomic transfers, and
//! reservations. The [`InventoryEngine`] handle is the surface the API
//! layer calls; everything underneath is deterministic domain logic.

pub mod catalog;
pub mod engine;
pub mod level;
pub mod locks;
pub mod reservation;
pub mod validate;

mod transfer;

#[cfg(test)]
mod integration_tests;

pub use catalog::{Catalog, Product, ProductPatch, Warehouse};
pub use engine::{
    InventoryEngine, InventorySummary, LowStockLine, ReservationRequest, StockInRequest,
    StockOutRequest, TransferRequest,
};
pub use level::{LevelBook, StockKey, StockLevel};
pub use locks::{KeyLockGuard, LockCoordinator};
pub use reservation::{Reservation, ReservationState, ReservationTable};
