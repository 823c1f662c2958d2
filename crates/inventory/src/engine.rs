//! The inventory engine facade.
//!
//! An explicit handle the API layer constructs at startup and passes by
//! reference (no ambient global). Every mutating path runs
//! validate → acquire key lock(s) → ledger append → level apply → unlock;
//! lock acquisition is the only blocking point, and no external work
//! happens while a lock is held.

use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use stockbook_core::{
    CorrelationId, InventoryError, InventoryResult, ProductId, ReservationId, WarehouseId,
};
use stockbook_ledger::{EntryCandidate, InMemoryLedger, LedgerStore, StockEntry};

use crate::catalog::{Catalog, Product, ProductPatch, Warehouse};
use crate::level::{LevelBook, StockLevel};
use crate::locks::LockCoordinator;
use crate::reservation::{Reservation, ReservationTable};
use crate::{transfer, validate};

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Receive stock into a warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockInRequest {
    pub product: ProductId,
    pub warehouse: WarehouseId,
    pub quantity: i64,
    pub reason: Option<String>,
    pub actor: Option<String>,
}

/// Issue stock out of a warehouse (consumes from available).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockOutRequest {
    pub product: ProductId,
    pub warehouse: WarehouseId,
    pub quantity: i64,
    pub reason: Option<String>,
    pub actor: Option<String>,
}

/// Move stock between two warehouses atomically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub product: ProductId,
    pub source: WarehouseId,
    pub destination: WarehouseId,
    pub quantity: i64,
    pub actor: Option<String>,
}

/// Place a hold against available stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationRequest {
    pub product: ProductId,
    pub warehouse: WarehouseId,
    pub quantity: i64,
    pub ttl: Duration,
}

/// One product whose total on-hand sits below its reorder threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowStockLine {
    pub product: ProductId,
    pub sku: String,
    pub name: String,
    pub reorder_threshold: i64,
    pub total_on_hand: i64,
}

/// Headline counts for dashboards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventorySummary {
    pub products: usize,
    pub warehouses: usize,
    pub stocked_keys: usize,
    pub movements: u64,
    pub low_stock_products: usize,
    pub active_reservations: usize,
}

/// Multi-warehouse inventory engine over an append-only ledger.
#[derive(Debug)]
pub struct InventoryEngine<S: LedgerStore = InMemoryLedger> {
    catalog: Catalog,
    ledger: S,
    book: LevelBook,
    locks: LockCoordinator,
    reservations: ReservationTable,
    lock_timeout: Duration,
}

impl InventoryEngine<InMemoryLedger> {
    /// Fresh engine over an empty in-memory ledger.
    pub fn in_memory() -> Self {
        Self {
            catalog: Catalog::new(),
            ledger: InMemoryLedger::new(),
            book: LevelBook::new(),
            locks: LockCoordinator::new(),
            reservations: ReservationTable::new(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

impl<S: LedgerStore> InventoryEngine<S> {
    /// Open an engine over an existing ledger, rebuilding all stock levels
    /// by replaying it from sequence 0.
    pub fn open(ledger: S) -> InventoryResult<Self> {
        let engine = Self {
            catalog: Catalog::new(),
            ledger,
            book: LevelBook::new(),
            locks: LockCoordinator::new(),
            reservations: ReservationTable::new(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        };
        engine.rebuild_levels()?;
        Ok(engine)
    }

    /// Budget for acquiring per-key locks before `LockTimeout` is returned.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn ledger(&self) -> &S {
        &self.ledger
    }

    // ---- catalog convenience -------------------------------------------

    pub fn add_product(&self, product: Product) -> InventoryResult<ProductId> {
        self.catalog.add_product(product)
    }

    pub fn update_product(&self, id: ProductId, patch: ProductPatch) -> InventoryResult<Product> {
        self.catalog.update_product(id, patch)
    }

    pub fn add_warehouse(&self, warehouse: Warehouse) -> InventoryResult<WarehouseId> {
        self.catalog.add_warehouse(warehouse)
    }

    // ---- movements ------------------------------------------------------

    /// Receive `quantity` units into a warehouse.
    pub fn stock_in(&self, req: StockInRequest) -> InventoryResult<StockEntry> {
        let mut candidate = EntryCandidate::receipt(req.product, req.warehouse, req.quantity);
        candidate.reason = req.reason;
        candidate.actor = req.actor;
        self.commit_movement(candidate)
    }

    /// Issue `quantity` units from a warehouse; validated against
    /// available stock, so active holds are respected.
    pub fn stock_out(&self, req: StockOutRequest) -> InventoryResult<StockEntry> {
        let mut candidate = EntryCandidate::issue(req.product, req.warehouse, req.quantity);
        candidate.reason = req.reason;
        candidate.actor = req.actor;
        self.commit_movement(candidate)
    }

    /// Record a signed correction (e.g. after a physical count).
    pub fn adjust(
        &self,
        product: ProductId,
        warehouse: WarehouseId,
        delta: i64,
        reason: impl Into<String>,
    ) -> InventoryResult<StockEntry> {
        let candidate = EntryCandidate::adjustment(product, warehouse, delta).with_reason(reason);
        self.commit_movement(candidate)
    }

    /// Single-key mutation pipeline shared by receipts, issues, and
    /// adjustments.
    fn commit_movement(&self, candidate: EntryCandidate) -> InventoryResult<StockEntry> {
        let key = (candidate.product, candidate.warehouse);
        let _guard = self.locks.acquire(&[key], self.lock_timeout)?;

        let level = self.book.get(candidate.product, candidate.warehouse);
        validate::admit(&self.catalog, &level, &candidate)?;

        let entry = self.ledger.append(candidate).map_err(InventoryError::from)?;
        let level = self.book.apply(&entry);

        info!(
            kind = entry.kind.as_str(),
            product = %entry.product,
            warehouse = %entry.warehouse,
            delta = entry.delta,
            on_hand = level.on_hand,
            sequence = entry.sequence,
            "movement committed"
        );
        Ok(entry)
    }

    /// Atomically move stock between two warehouses.
    pub fn transfer(&self, req: TransferRequest) -> InventoryResult<CorrelationId> {
        let ctx = transfer::TransferContext {
            catalog: &self.catalog,
            locks: &self.locks,
            lock_timeout: self.lock_timeout,
            ledger: &self.ledger,
            book: &self.book,
        };
        transfer::execute(
            &ctx,
            req.product,
            req.source,
            req.destination,
            req.quantity,
            req.actor.as_deref(),
        )
    }

    // ---- reservations ---------------------------------------------------

    /// Hold `quantity` units of available stock for `ttl`.
    pub fn hold(&self, req: ReservationRequest) -> InventoryResult<Reservation> {
        if req.quantity <= 0 {
            return Err(InventoryError::NonPositiveQuantity {
                product: req.product,
                warehouse: req.warehouse,
                quantity: req.quantity,
            });
        }
        if !self.catalog.has_product(req.product) {
            return Err(InventoryError::UnknownProduct { product: req.product });
        }
        if !self.catalog.has_warehouse(req.warehouse) {
            return Err(InventoryError::UnknownWarehouse { warehouse: req.warehouse });
        }

        let key = (req.product, req.warehouse);
        let _guard = self.locks.acquire(&[key], self.lock_timeout)?;

        let level = self.book.get(req.product, req.warehouse);
        if req.quantity > level.available() {
            return Err(InventoryError::InsufficientAvailable {
                product: req.product,
                warehouse: req.warehouse,
                requested: req.quantity,
                available: level.available(),
            });
        }

        let now = Utc::now();
        let expires_at = ChronoDuration::from_std(req.ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(chrono::DateTime::<Utc>::MAX_UTC);
        let reservation =
            Reservation::new(req.product, req.warehouse, req.quantity, now, expires_at);

        self.book.reserve(req.product, req.warehouse, req.quantity);
        self.reservations.insert(reservation.clone());

        info!(
            reservation = %reservation.id,
            product = %req.product,
            warehouse = %req.warehouse,
            quantity = req.quantity,
            "hold placed"
        );
        Ok(reservation)
    }

    /// Convert an active hold into an issue entry.
    ///
    /// Commit and expiry both run under the reservation's key lock;
    /// whichever wins the lock wins the race.
    pub fn commit_reservation(&self, id: ReservationId) -> InventoryResult<StockEntry> {
        let res = self
            .reservations
            .get(id)
            .ok_or(InventoryError::ReservationNotFound { reservation: id })?;

        let key = (res.product, res.warehouse);
        let _guard = self.locks.acquire(&[key], self.lock_timeout)?;

        let now = Utc::now();
        if let Some(expired) = self.reservations.expire_if_due(id, now) {
            self.book.unreserve(expired.product, expired.warehouse, expired.quantity);
            warn!(reservation = %id, "commit lost the race to expiry");
            return Err(InventoryError::ReservationExpired { reservation: id });
        }
        let res = self.reservations.require_active(id, now)?;

        let candidate = EntryCandidate::issue(res.product, res.warehouse, res.quantity)
            .with_correlation(CorrelationId::from_uuid(*id.as_uuid()))
            .with_reason("reservation commit");
        // The hold guarantees on-hand covers the quantity; no availability
        // re-check is needed (available >= 0 implies on_hand >= reserved).
        let entry = self.ledger.append(candidate).map_err(InventoryError::from)?;

        self.book.apply(&entry);
        self.book.unreserve(res.product, res.warehouse, res.quantity);
        self.reservations.mark_committed(id);

        info!(
            reservation = %id,
            product = %res.product,
            warehouse = %res.warehouse,
            quantity = res.quantity,
            sequence = entry.sequence,
            "reservation committed"
        );
        Ok(entry)
    }

    /// Release a hold without a ledger effect. Idempotent.
    pub fn release_reservation(&self, id: ReservationId) -> InventoryResult<()> {
        let res = self
            .reservations
            .get(id)
            .ok_or(InventoryError::ReservationNotFound { reservation: id })?;

        let key = (res.product, res.warehouse);
        let _guard = self.locks.acquire(&[key], self.lock_timeout)?;

        if let Some(released) = self.reservations.release(id)? {
            self.book
                .unreserve(released.product, released.warehouse, released.quantity);
            info!(reservation = %id, "hold released");
        }
        Ok(())
    }

    /// Expire reservations past their ttl, restoring availability.
    ///
    /// Suitable for a periodic background task; each candidate is
    /// re-checked under its key lock so a concurrent commit cannot be
    /// clobbered. Returns the number of reservations expired.
    pub fn sweep_expired_reservations(&self) -> InventoryResult<usize> {
        let now = Utc::now();
        let mut swept = 0;
        for candidate in self.reservations.expired_candidates(now) {
            let key = (candidate.product, candidate.warehouse);
            let _guard = self.locks.acquire(&[key], self.lock_timeout)?;
            if let Some(expired) = self.reservations.expire_if_due(candidate.id, now) {
                self.book
                    .unreserve(expired.product, expired.warehouse, expired.quantity);
                swept += 1;
                info!(reservation = %expired.id, "hold expired");
            }
        }
        Ok(swept)
    }

    // ---- reads ----------------------------------------------------------

    /// Current stock position for one key (zero row if never stocked).
    pub fn stock_level(&self, product: ProductId, warehouse: WarehouseId) -> StockLevel {
        self.book.get(product, warehouse)
    }

    /// Movement history for one key, oldest first.
    pub fn list_movements(
        &self,
        product: ProductId,
        warehouse: WarehouseId,
        since_sequence: u64,
    ) -> InventoryResult<Vec<StockEntry>> {
        self.ledger
            .movements(product, warehouse, since_sequence)
            .map_err(InventoryError::from)
    }

    /// Rebuild every stock level from a full ledger replay, then restore
    /// reserved quantities from active holds. The result is identical to
    /// the incrementally maintained state.
    pub fn rebuild_levels(&self) -> InventoryResult<()> {
        let entries = self.ledger.replay(0).map_err(InventoryError::from)?;
        self.book.rebuild(entries);
        for res in self.reservations.active() {
            self.book.reserve(res.product, res.warehouse, res.quantity);
        }
        Ok(())
    }

    // ---- reports --------------------------------------------------------

    /// All non-zero stock rows, key order.
    pub fn stock_snapshot(&self) -> Vec<StockLevel> {
        self.book.snapshot()
    }

    /// Products whose total on-hand across warehouses sits below their
    /// reorder threshold.
    pub fn low_stock_products(&self) -> Vec<LowStockLine> {
        self.catalog
            .list_products()
            .into_iter()
            .filter(|p| p.reorder_threshold > 0)
            .filter_map(|p| {
                let total = self.book.total_on_hand(p.id);
                (total < p.reorder_threshold).then(|| LowStockLine {
                    product: p.id,
                    sku: p.sku,
                    name: p.name,
                    reorder_threshold: p.reorder_threshold,
                    total_on_hand: total,
                })
            })
            .collect()
    }

    /// Headline counts.
    pub fn summary(&self) -> InventoryResult<InventorySummary> {
        Ok(InventorySummary {
            products: self.catalog.product_count(),
            warehouses: self.catalog.warehouse_count(),
            stocked_keys: self.book.stocked_key_count(),
            movements: self.ledger.head_sequence().map_err(InventoryError::from)?,
            low_stock_products: self.low_stock_products().len(),
            active_reservations: self.reservations.active_count(),
        })
    }
}
