//! `stockbook-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no engine logic, no
//! storage concerns): strongly-typed identifiers, the inventory error
//! taxonomy, and telemetry initialization.

pub mod error;
pub mod id;
pub mod telemetry;

pub use error::{InventoryError, InventoryResult};
pub use id::{CorrelationId, ProductId, ReservationId, WarehouseId};
