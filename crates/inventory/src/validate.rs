//! Movement admission checks.
//!
//! Runs after the key lock is acquired and before anything reaches the
//! ledger: a rejected movement leaves no trace.
//!
//! Policy: issues and transfer-outs consume from **available** (on hand
//! minus reserved), so ordinary stock-outs respect active holds. Receipts
//! and transfer-ins act on on-hand directly; adjustments do too, except
//! that a downward correction may never leave less on hand than is
//! promised to active holds.

use stockbook_core::{InventoryError, InventoryResult};
use stockbook_ledger::{EntryCandidate, MovementKind};

use crate::catalog::Catalog;
use crate::level::StockLevel;

/// Admit or reject a candidate movement against the current level.
pub fn admit(catalog: &Catalog, level: &StockLevel, candidate: &EntryCandidate) -> InventoryResult<()> {
    if !catalog.has_product(candidate.product) {
        return Err(InventoryError::UnknownProduct {
            product: candidate.product,
        });
    }
    if !catalog.has_warehouse(candidate.warehouse) {
        return Err(InventoryError::UnknownWarehouse {
            warehouse: candidate.warehouse,
        });
    }

    match candidate.kind {
        MovementKind::Receipt | MovementKind::TransferIn => {
            if candidate.delta <= 0 {
                return Err(non_positive(candidate));
            }
        }
        MovementKind::Issue | MovementKind::TransferOut => {
            if candidate.delta >= 0 {
                return Err(non_positive(candidate));
            }
            let requested = -candidate.delta;
            let available = level.available();
            if requested > available {
                return Err(InventoryError::InsufficientStock {
                    product: candidate.product,
                    warehouse: candidate.warehouse,
                    requested,
                    available,
                });
            }
        }
        MovementKind::Adjustment => {
            if candidate.delta == 0 {
                return Err(non_positive(candidate));
            }
            // Downward corrections may not push on-hand below zero, nor
            // below the quantity promised to active holds.
            if candidate.delta < 0 && level.on_hand + candidate.delta < level.reserved {
                return Err(InventoryError::InsufficientStock {
                    product: candidate.product,
                    warehouse: candidate.warehouse,
                    requested: -candidate.delta,
                    available: level.available(),
                });
            }
        }
    }

    Ok(())
}

fn non_positive(candidate: &EntryCandidate) -> InventoryError {
    InventoryError::NonPositiveQuantity {
        product: candidate.product,
        warehouse: candidate.warehouse,
        quantity: candidate.delta.abs(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Product, Warehouse};
    use stockbook_core::{ProductId, WarehouseId};

    fn setup() -> (Catalog, ProductId, WarehouseId) {
        let catalog = Catalog::new();
        let product = Product::new("SKU-1", "Widget", "pcs");
        let warehouse = Warehouse::new("WH-A", "Main");
        let (p, w) = (product.id, warehouse.id);
        catalog.add_product(product).unwrap();
        catalog.add_warehouse(warehouse).unwrap();
        (catalog, p, w)
    }

    fn level_with(p: ProductId, w: WarehouseId, on_hand: i64, reserved: i64) -> StockLevel {
        StockLevel {
            product: p,
            warehouse: w,
            on_hand,
            reserved,
            last_applied: 0,
        }
    }

    #[test]
    fn receipt_into_known_key_is_admitted() {
        let (catalog, p, w) = setup();
        let level = StockLevel::empty(p, w);
        admit(&catalog, &level, &EntryCandidate::receipt(p, w, 10)).unwrap();
    }

    #[test]
    fn unknown_product_and_warehouse_are_rejected() {
        let (catalog, p, w) = setup();
        let stranger = ProductId::new();
        let level = StockLevel::empty(stranger, w);
        let err = admit(&catalog, &level, &EntryCandidate::receipt(stranger, w, 1)).unwrap_err();
        assert!(matches!(err, InventoryError::UnknownProduct { .. }));

        let nowhere = WarehouseId::new();
        let level = StockLevel::empty(p, nowhere);
        let err = admit(&catalog, &level, &EntryCandidate::receipt(p, nowhere, 1)).unwrap_err();
        assert!(matches!(err, InventoryError::UnknownWarehouse { .. }));
    }

    #[test]
    fn zero_quantity_movement_is_rejected() {
        let (catalog, p, w) = setup();
        let level = StockLevel::empty(p, w);
        let err = admit(&catalog, &level, &EntryCandidate::receipt(p, w, 0)).unwrap_err();
        assert!(matches!(err, InventoryError::NonPositiveQuantity { .. }));
    }

    #[test]
    fn issue_validates_against_available_not_on_hand() {
        let (catalog, p, w) = setup();
        // 100 on hand, 30 reserved: only 70 may be issued.
        let level = level_with(p, w, 100, 30);

        admit(&catalog, &level, &EntryCandidate::issue(p, w, 70)).unwrap();

        let err = admit(&catalog, &level, &EntryCandidate::issue(p, w, 71)).unwrap_err();
        assert_eq!(
            err,
            InventoryError::InsufficientStock {
                product: p,
                warehouse: w,
                requested: 71,
                available: 70,
            }
        );
    }

    #[test]
    fn downward_adjustment_cannot_push_on_hand_negative() {
        let (catalog, p, w) = setup();
        let level = level_with(p, w, 5, 0);

        admit(&catalog, &level, &EntryCandidate::adjustment(p, w, -5)).unwrap();
        let err = admit(&catalog, &level, &EntryCandidate::adjustment(p, w, -6)).unwrap_err();
        assert!(matches!(err, InventoryError::InsufficientStock { .. }));
    }

    #[test]
    fn downward_adjustment_cannot_invalidate_active_holds() {
        let (catalog, p, w) = setup();
        // 10 on hand, 6 reserved: at most 4 may be written off.
        let level = level_with(p, w, 10, 6);
        admit(&catalog, &level, &EntryCandidate::adjustment(p, w, -4)).unwrap();
        let err = admit(&catalog, &level, &EntryCandidate::adjustment(p, w, -5)).unwrap_err();
        assert!(matches!(err, InventoryError::InsufficientStock { .. }));
    }
}
