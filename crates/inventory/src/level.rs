//! Derived stock levels per (product, warehouse).
//!
//! The [`LevelBook`] is a disposable cache over the ledger: every row is
//! recomputable by replaying entries from sequence 0, and the per-row
//! cursor (`last_applied`) makes `apply` idempotent under replay.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use stockbook_core::{ProductId, WarehouseId};
use stockbook_ledger::StockEntry;

/// The (product, warehouse) key every level row and lock hangs off.
pub type StockKey = (ProductId, WarehouseId);

/// Current stock position for one (product, warehouse) key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    pub product: ProductId,
    pub warehouse: WarehouseId,
    /// Physical quantity, sum of all ledger deltas up to `last_applied`.
    pub on_hand: i64,
    /// Quantity held by active reservations (no ledger effect yet).
    pub reserved: i64,
    /// Sequence number of the last ledger entry folded into `on_hand`.
    pub last_applied: u64,
}

impl StockLevel {
    /// Zero row for a key with no recorded movements.
    pub fn empty(product: ProductId, warehouse: WarehouseId) -> Self {
        Self {
            product,
            warehouse,
            on_hand: 0,
            reserved: 0,
            last_applied: 0,
        }
    }

    /// Quantity a new order may consume.
    pub fn available(&self) -> i64 {
        self.on_hand - self.reserved
    }
}

/// Arena of (product, warehouse) → [`StockLevel`] rows.
#[derive(Debug, Default)]
pub struct LevelBook {
    rows: RwLock<HashMap<StockKey, StockLevel>>,
}

impl LevelBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one committed ledger entry into its row.
    ///
    /// Must be called with the key's lock held. Entries at or below the
    /// row's cursor are ignored, so replays are idempotent.
    pub fn apply(&self, entry: &StockEntry) -> StockLevel {
        let mut rows = self.rows.write().unwrap_or_else(|e| e.into_inner());
        let row = rows
            .entry((entry.product, entry.warehouse))
            .or_insert_with(|| StockLevel::empty(entry.product, entry.warehouse));

        if entry.sequence > row.last_applied {
            row.on_hand += entry.delta;
            row.last_applied = entry.sequence;
        }
        *row
    }

    /// Current row for a key; a zero row if nothing was ever recorded.
    pub fn get(&self, product: ProductId, warehouse: WarehouseId) -> StockLevel {
        let rows = self.rows.read().unwrap_or_else(|e| e.into_inner());
        rows.get(&(product, warehouse))
            .copied()
            .unwrap_or_else(|| StockLevel::empty(product, warehouse))
    }

    /// Increase the reserved column. Caller holds the key lock and has
    /// already checked availability.
    pub fn reserve(&self, product: ProductId, warehouse: WarehouseId, quantity: i64) -> StockLevel {
        let mut rows = self.rows.write().unwrap_or_else(|e| e.into_inner());
        let row = rows
            .entry((product, warehouse))
            .or_insert_with(|| StockLevel::empty(product, warehouse));
        row.reserved += quantity;
        *row
    }

    /// Return previously reserved quantity to availability.
    pub fn unreserve(&self, product: ProductId, warehouse: WarehouseId, quantity: i64) -> StockLevel {
        let mut rows = self.rows.write().unwrap_or_else(|e| e.into_inner());
        let row = rows
            .entry((product, warehouse))
            .or_insert_with(|| StockLevel::empty(product, warehouse));
        row.reserved = (row.reserved - quantity).max(0);
        *row
    }

    /// Throw away all rows and refold the given entries in order.
    ///
    /// Reserved quantities are not part of the ledger; the engine restores
    /// them from the reservation table after a rebuild.
    pub fn rebuild<I>(&self, entries: I)
    where
        I: IntoIterator<Item = StockEntry>,
    {
        let mut rows = self.rows.write().unwrap_or_else(|e| e.into_inner());
        rows.clear();
        for entry in entries {
            let row = rows
                .entry((entry.product, entry.warehouse))
                .or_insert_with(|| StockLevel::empty(entry.product, entry.warehouse));
            if entry.sequence > row.last_applied {
                row.on_hand += entry.delta;
                row.last_applied = entry.sequence;
            }
        }
    }

    /// All rows with stock on hand or reserved, key order.
    pub fn snapshot(&self) -> Vec<StockLevel> {
        let rows = self.rows.read().unwrap_or_else(|e| e.into_inner());
        let mut levels: Vec<_> = rows
            .values()
            .filter(|l| l.on_hand != 0 || l.reserved != 0)
            .copied()
            .collect();
        levels.sort_by_key(|l| (l.product, l.warehouse));
        levels
    }

    /// Total on-hand for a product across all warehouses.
    pub fn total_on_hand(&self, product: ProductId) -> i64 {
        let rows = self.rows.read().unwrap_or_else(|e| e.into_inner());
        rows.values()
            .filter(|l| l.product == product)
            .map(|l| l.on_hand)
            .sum()
    }

    pub fn stocked_key_count(&self) -> usize {
        let rows = self.rows.read().unwrap_or_else(|e| e.into_inner());
        rows.values().filter(|l| l.on_hand != 0).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockbook_ledger::{EntryCandidate, InMemoryLedger, LedgerStore};

    fn key() -> (ProductId, WarehouseId) {
        (ProductId::new(), WarehouseId::new())
    }

    #[test]
    fn apply_folds_deltas_and_tracks_cursor() {
        let ledger = InMemoryLedger::new();
        let book = LevelBook::new();
        let (p, w) = key();

        let e1 = ledger.append(EntryCandidate::receipt(p, w, 10)).unwrap();
        let e2 = ledger.append(EntryCandidate::issue(p, w, 4)).unwrap();

        book.apply(&e1);
        let level = book.apply(&e2);

        assert_eq!(level.on_hand, 6);
        assert_eq!(level.last_applied, e2.sequence);
    }

    #[test]
    fn apply_is_idempotent_at_or_below_cursor() {
        let ledger = InMemoryLedger::new();
        let book = LevelBook::new();
        let (p, w) = key();

        let e1 = ledger.append(EntryCandidate::receipt(p, w, 10)).unwrap();
        book.apply(&e1);
        let level = book.apply(&e1);

        assert_eq!(level.on_hand, 10);
        assert_eq!(level.last_applied, e1.sequence);
    }

    #[test]
    fn rebuild_matches_incremental_state() {
        let ledger = InMemoryLedger::new();
        let incremental = LevelBook::new();
        let (p, w) = key();
        let (p2, w2) = key();

        for candidate in [
            EntryCandidate::receipt(p, w, 100),
            EntryCandidate::receipt(p2, w2, 30),
            EntryCandidate::issue(p, w, 25),
            EntryCandidate::adjustment(p2, w2, -5),
        ] {
            let entry = ledger.append(candidate).unwrap();
            incremental.apply(&entry);
        }

        let rebuilt = LevelBook::new();
        rebuilt.rebuild(ledger.replay(0).unwrap());

        assert_eq!(rebuilt.snapshot(), incremental.snapshot());
    }

    #[test]
    fn reservation_columns_move_availability_not_on_hand() {
        let book = LevelBook::new();
        let (p, w) = key();

        let ledger = InMemoryLedger::new();
        let e = ledger.append(EntryCandidate::receipt(p, w, 50)).unwrap();
        book.apply(&e);

        let level = book.reserve(p, w, 20);
        assert_eq!(level.on_hand, 50);
        assert_eq!(level.reserved, 20);
        assert_eq!(level.available(), 30);

        let level = book.unreserve(p, w, 20);
        assert_eq!(level.available(), 50);
    }

    #[test]
    fn total_on_hand_sums_across_warehouses() {
        let book = LevelBook::new();
        let p = ProductId::new();
        let (w1, w2) = (WarehouseId::new(), WarehouseId::new());
        let ledger = InMemoryLedger::new();

        book.apply(&ledger.append(EntryCandidate::receipt(p, w1, 10)).unwrap());
        book.apply(&ledger.append(EntryCandidate::receipt(p, w2, 15)).unwrap());

        assert_eq!(book.total_on_hand(p), 25);
    }
}
