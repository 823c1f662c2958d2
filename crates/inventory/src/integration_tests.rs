//! Full-engine tests: movements, transfers, reservations, replay, and the
//! concurrency properties the engine guarantees.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;

use stockbook_core::{InventoryError, ProductId, WarehouseId};
use stockbook_ledger::{
    EntryCandidate, InMemoryLedger, LedgerError, LedgerStore, MovementKind, StockEntry,
};

use crate::catalog::{Product, Warehouse};
use crate::engine::{
    InventoryEngine, ReservationRequest, StockInRequest, StockOutRequest, TransferRequest,
};

fn stock_in(engine: &InventoryEngine<impl LedgerStore>, p: ProductId, w: WarehouseId, q: i64) {
    engine
        .stock_in(StockInRequest {
            product: p,
            warehouse: w,
            quantity: q,
            reason: None,
            actor: None,
        })
        .unwrap();
}

fn stock_out_req(p: ProductId, w: WarehouseId, q: i64) -> StockOutRequest {
    StockOutRequest {
        product: p,
        warehouse: w,
        quantity: q,
        reason: None,
        actor: None,
    }
}

/// Engine with one product and two warehouses.
fn setup() -> (InventoryEngine, ProductId, WarehouseId, WarehouseId) {
    stockbook_core::telemetry::init();
    let engine = InventoryEngine::in_memory();
    let p = engine
        .add_product(Product::new("WID-1", "Widget", "pcs"))
        .unwrap();
    let a = engine.add_warehouse(Warehouse::new("WH-A", "Alpha")).unwrap();
    let b = engine.add_warehouse(Warehouse::new("WH-B", "Beta")).unwrap();
    (engine, p, a, b)
}

#[test]
fn literal_scenario_from_receipt_to_failed_issue() {
    let (engine, p, a, b) = setup();

    // Warehouse A starts at 100 units.
    stock_in(&engine, p, a, 100);

    // Stock-in 50 -> on-hand 150.
    stock_in(&engine, p, a, 50);
    assert_eq!(engine.stock_level(p, a).on_hand, 150);

    // Transfer 40 A -> B.
    engine
        .transfer(TransferRequest {
            product: p,
            source: a,
            destination: b,
            quantity: 40,
            actor: None,
        })
        .unwrap();
    assert_eq!(engine.stock_level(p, a).on_hand, 110);
    assert_eq!(engine.stock_level(p, b).on_hand, 40);

    // Hold 30 at A: available drops, on-hand does not.
    let hold = engine
        .hold(ReservationRequest {
            product: p,
            warehouse: a,
            quantity: 30,
            ttl: Duration::from_secs(5),
        })
        .unwrap();
    let level = engine.stock_level(p, a);
    assert_eq!(level.on_hand, 110);
    assert_eq!(level.available(), 80);

    // Commit the hold -> on-hand 80, reserved 0.
    engine.commit_reservation(hold.id).unwrap();
    let level = engine.stock_level(p, a);
    assert_eq!(level.on_hand, 80);
    assert_eq!(level.reserved, 0);

    // Issuing 90 now fails: only 80 available.
    let err = engine.stock_out(stock_out_req(p, a, 90)).unwrap_err();
    assert_eq!(
        err,
        InventoryError::InsufficientStock {
            product: p,
            warehouse: a,
            requested: 90,
            available: 80,
        }
    );
}

#[test]
fn transfer_legs_share_a_correlation_and_sum_to_zero() {
    let (engine, p, a, b) = setup();
    stock_in(&engine, p, a, 100);

    let correlation = engine
        .transfer(TransferRequest {
            product: p,
            source: a,
            destination: b,
            quantity: 25,
            actor: Some("ops".to_string()),
        })
        .unwrap();

    let legs: Vec<StockEntry> = engine
        .ledger()
        .replay(0)
        .unwrap()
        .into_iter()
        .filter(|e| e.correlation == Some(correlation))
        .collect();

    assert_eq!(legs.len(), 2);
    assert_eq!(legs[0].kind, MovementKind::TransferOut);
    assert_eq!(legs[1].kind, MovementKind::TransferIn);
    assert_eq!(legs[0].delta + legs[1].delta, 0);
}

#[test]
fn rejected_transfer_appends_nothing() {
    let (engine, p, a, b) = setup();
    stock_in(&engine, p, a, 10);
    let before = engine.ledger().head_sequence().unwrap();

    let err = engine
        .transfer(TransferRequest {
            product: p,
            source: a,
            destination: b,
            quantity: 11,
            actor: None,
        })
        .unwrap_err();
    assert!(matches!(err, InventoryError::InsufficientStock { .. }));
    assert_eq!(engine.ledger().head_sequence().unwrap(), before);

    let err = engine
        .transfer(TransferRequest {
            product: p,
            source: a,
            destination: a,
            quantity: 5,
            actor: None,
        })
        .unwrap_err();
    assert_eq!(err, InventoryError::SameWarehouse { warehouse: a });
    assert_eq!(engine.ledger().head_sequence().unwrap(), before);
}

/// Ledger double that fails exactly one chosen append call, counting from 1.
#[derive(Debug)]
struct FailingLedger {
    inner: InMemoryLedger,
    calls: AtomicU64,
    fail_on_call: u64,
}

impl FailingLedger {
    fn new(fail_on_call: u64) -> Self {
        Self {
            inner: InMemoryLedger::new(),
            calls: AtomicU64::new(0),
            fail_on_call,
        }
    }
}

impl LedgerStore for FailingLedger {
    fn append(&self, candidate: EntryCandidate) -> Result<StockEntry, LedgerError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.fail_on_call {
            return Err(LedgerError::Backend("injected append failure".to_string()));
        }
        self.inner.append(candidate)
    }

    fn replay(&self, from_sequence: u64) -> Result<Vec<StockEntry>, LedgerError> {
        self.inner.replay(from_sequence)
    }

    fn head_sequence(&self) -> Result<u64, LedgerError> {
        self.inner.head_sequence()
    }
}

#[test]
fn failed_credit_leg_is_compensated_before_locks_release() {
    // Call 1: seed receipt. Call 2: debit leg. Call 3: credit leg (fails).
    // Call 4: compensation.
    let engine = InventoryEngine::open(FailingLedger::new(3)).unwrap();
    let p = engine
        .add_product(Product::new("WID-1", "Widget", "pcs"))
        .unwrap();
    let a = engine.add_warehouse(Warehouse::new("WH-A", "Alpha")).unwrap();
    let b = engine.add_warehouse(Warehouse::new("WH-B", "Beta")).unwrap();
    stock_in(&engine, p, a, 100);

    let err = engine
        .transfer(TransferRequest {
            product: p,
            source: a,
            destination: b,
            quantity: 40,
            actor: None,
        })
        .unwrap_err();
    assert!(matches!(err, InventoryError::LedgerWriteFailure(_)));

    // Net state is balance-preserving: the debit and its compensation
    // cancel, and history shows both under the transfer's correlation id.
    assert_eq!(engine.stock_level(p, a).on_hand, 100);
    assert_eq!(engine.stock_level(p, b).on_hand, 0);

    let entries = engine.ledger().replay(0).unwrap();
    assert_eq!(entries.len(), 3); // receipt + debit + compensation
    let correlated: Vec<_> = entries.iter().filter(|e| e.correlation.is_some()).collect();
    assert_eq!(correlated.len(), 2);
    assert_eq!(correlated.iter().map(|e| e.delta).sum::<i64>(), 0);
    assert_eq!(correlated[1].kind, MovementKind::Adjustment);
}

#[test]
fn concurrent_stock_outs_never_oversell() {
    let (engine, p, a, _) = setup();
    stock_in(&engine, p, a, 100);

    let engine = Arc::new(engine);
    let handles: Vec<_> = (0..10)
        .map(|_| {
            let engine = engine.clone();
            std::thread::spawn(move || engine.stock_out(stock_out_req(p, a, 30)))
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let successes = results.iter().filter(|r| r.is_ok()).count();
    let insufficient = results
        .iter()
        .filter(|r| matches!(r, Err(InventoryError::InsufficientStock { .. })))
        .count();

    // floor(100 / 30) = 3 succeed regardless of scheduling.
    assert_eq!(successes, 3);
    assert_eq!(insufficient, 7);
    assert_eq!(engine.stock_level(p, a).on_hand, 10);
}

#[test]
fn opposing_concurrent_transfers_settle_deterministically() {
    let (engine, p, a, b) = setup();
    stock_in(&engine, p, a, 100);
    stock_in(&engine, p, b, 100);

    let engine = Arc::new(engine);
    let handles: Vec<_> = [(a, b, 50), (b, a, 30)]
        .into_iter()
        .map(|(src, dst, qty)| {
            let engine = engine.clone();
            std::thread::spawn(move || {
                engine.transfer(TransferRequest {
                    product: p,
                    source: src,
                    destination: dst,
                    quantity: qty,
                    actor: None,
                })
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap().unwrap();
    }

    assert_eq!(engine.stock_level(p, a).on_hand, 80);
    assert_eq!(engine.stock_level(p, b).on_hand, 120);
}

#[test]
fn concurrent_transfers_conserve_total_stock() {
    let (engine, p, a, b) = setup();
    let c = engine.add_warehouse(Warehouse::new("WH-C", "Gamma")).unwrap();
    for w in [a, b, c] {
        stock_in(&engine, p, w, 200);
    }

    let engine = Arc::new(engine);
    let routes = [(a, b), (b, c), (c, a), (b, a), (c, b), (a, c)];
    let handles: Vec<_> = routes
        .into_iter()
        .map(|(src, dst)| {
            let engine = engine.clone();
            std::thread::spawn(move || {
                for qty in 1..=10 {
                    // Some transfers may reject on insufficient stock;
                    // either way no stock is created or destroyed.
                    let _ = engine.transfer(TransferRequest {
                        product: p,
                        source: src,
                        destination: dst,
                        quantity: qty,
                        actor: None,
                    });
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let total: i64 = [a, b, c]
        .iter()
        .map(|w| engine.stock_level(p, *w).on_hand)
        .sum();
    assert_eq!(total, 600);
    for w in [a, b, c] {
        assert!(engine.stock_level(p, w).on_hand >= 0);
    }
}

#[test]
fn replay_rebuild_matches_incremental_levels() {
    let (engine, p, a, b) = setup();
    stock_in(&engine, p, a, 120);
    engine.stock_out(stock_out_req(p, a, 20)).unwrap();
    engine
        .transfer(TransferRequest {
            product: p,
            source: a,
            destination: b,
            quantity: 30,
            actor: None,
        })
        .unwrap();
    engine.adjust(p, b, -5, "cycle count").unwrap();

    let hold = engine
        .hold(ReservationRequest {
            product: p,
            warehouse: a,
            quantity: 10,
            ttl: Duration::from_secs(60),
        })
        .unwrap();

    let before = engine.stock_snapshot();
    engine.rebuild_levels().unwrap();
    assert_eq!(engine.stock_snapshot(), before);

    // The rebuilt book still knows about the active hold.
    assert_eq!(engine.stock_level(p, a).reserved, hold.quantity);
}

#[test]
fn expired_hold_restores_availability_and_commit_fails() {
    let (engine, p, a, _) = setup();
    stock_in(&engine, p, a, 50);

    let hold = engine
        .hold(ReservationRequest {
            product: p,
            warehouse: a,
            quantity: 20,
            ttl: Duration::from_millis(10),
        })
        .unwrap();
    assert_eq!(engine.stock_level(p, a).available(), 30);

    std::thread::sleep(Duration::from_millis(30));

    let err = engine.commit_reservation(hold.id).unwrap_err();
    assert_eq!(err, InventoryError::ReservationExpired { reservation: hold.id });
    assert_eq!(engine.stock_level(p, a).available(), 50);

    // No ledger movement was recorded for the expired hold.
    assert_eq!(engine.ledger().head_sequence().unwrap(), 1);
}

#[test]
fn sweep_expires_due_holds_only() {
    let (engine, p, a, _) = setup();
    stock_in(&engine, p, a, 50);

    engine
        .hold(ReservationRequest {
            product: p,
            warehouse: a,
            quantity: 10,
            ttl: Duration::from_millis(5),
        })
        .unwrap();
    let fresh = engine
        .hold(ReservationRequest {
            product: p,
            warehouse: a,
            quantity: 15,
            ttl: Duration::from_secs(60),
        })
        .unwrap();

    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(engine.sweep_expired_reservations().unwrap(), 1);

    let level = engine.stock_level(p, a);
    assert_eq!(level.reserved, fresh.quantity);
    assert_eq!(level.available(), 35);
}

#[test]
fn committed_hold_cannot_be_committed_again() {
    let (engine, p, a, _) = setup();
    stock_in(&engine, p, a, 50);

    let hold = engine
        .hold(ReservationRequest {
            product: p,
            warehouse: a,
            quantity: 20,
            ttl: Duration::from_secs(60),
        })
        .unwrap();
    engine.commit_reservation(hold.id).unwrap();

    let err = engine.commit_reservation(hold.id).unwrap_err();
    assert_eq!(err, InventoryError::AlreadyCommitted { reservation: hold.id });
}

#[test]
fn hold_respects_available_not_on_hand() {
    let (engine, p, a, _) = setup();
    stock_in(&engine, p, a, 50);

    engine
        .hold(ReservationRequest {
            product: p,
            warehouse: a,
            quantity: 40,
            ttl: Duration::from_secs(60),
        })
        .unwrap();

    let err = engine
        .hold(ReservationRequest {
            product: p,
            warehouse: a,
            quantity: 11,
            ttl: Duration::from_secs(60),
        })
        .unwrap_err();
    assert_eq!(
        err,
        InventoryError::InsufficientAvailable {
            product: p,
            warehouse: a,
            requested: 11,
            available: 10,
        }
    );
}

#[test]
fn low_stock_and_summary_reports() {
    let engine = InventoryEngine::in_memory();
    let low = engine
        .add_product(Product::new("LOW-1", "Scarce", "pcs").with_reorder_threshold(50))
        .unwrap();
    let ok = engine
        .add_product(Product::new("OK-1", "Plenty", "pcs").with_reorder_threshold(10))
        .unwrap();
    let a = engine.add_warehouse(Warehouse::new("WH-A", "Alpha")).unwrap();
    stock_in(&engine, low, a, 20);
    stock_in(&engine, ok, a, 100);

    let lines = engine.low_stock_products();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].product, low);
    assert_eq!(lines[0].total_on_hand, 20);

    let summary = engine.summary().unwrap();
    assert_eq!(summary.products, 2);
    assert_eq!(summary.warehouses, 1);
    assert_eq!(summary.stocked_keys, 2);
    assert_eq!(summary.movements, 2);
    assert_eq!(summary.low_stock_products, 1);
    assert_eq!(summary.active_reservations, 0);
}

#[test]
fn list_movements_filters_key_and_sequence() {
    let (engine, p, a, b) = setup();
    stock_in(&engine, p, a, 10);
    stock_in(&engine, p, b, 20);
    engine.stock_out(stock_out_req(p, a, 5)).unwrap();

    let history = engine.list_movements(p, a, 0).unwrap();
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|e| e.warehouse == a));

    let since = engine.list_movements(p, a, history[1].sequence).unwrap();
    assert_eq!(since.len(), 1);
    assert_eq!(since[0].kind, MovementKind::Issue);
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        ..ProptestConfig::default()
    })]

    /// Property: for any sequence of accepted operations, on-hand and
    /// available never go negative, and a full replay reproduces the
    /// incrementally maintained levels exactly.
    #[test]
    fn accepted_operations_preserve_invariants(
        ops in prop::collection::vec((0u8..4, 1i64..60), 1..60)
    ) {
        let (engine, p, a, b) = setup();

        for (op, qty) in ops {
            // Rejections are fine; accepted operations must keep the
            // invariants.
            let _ = match op {
                0 => engine.stock_in(StockInRequest {
                    product: p,
                    warehouse: a,
                    quantity: qty,
                    reason: None,
                    actor: None,
                }).map(|_| ()),
                1 => engine.stock_out(stock_out_req(p, a, qty)).map(|_| ()),
                2 => engine.transfer(TransferRequest {
                    product: p,
                    source: a,
                    destination: b,
                    quantity: qty,
                    actor: None,
                }).map(|_| ()),
                _ => engine.adjust(p, a, -qty, "shrinkage").map(|_| ()),
            };

            for w in [a, b] {
                let level = engine.stock_level(p, w);
                prop_assert!(level.on_hand >= 0);
                prop_assert!(level.available() >= 0);
            }
        }

        let before = engine.stock_snapshot();
        engine.rebuild_levels().unwrap();
        prop_assert_eq!(engine.stock_snapshot(), before);
    }
}
