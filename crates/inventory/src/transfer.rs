//! Two-leg stock transfers.
//!
//! A transfer moves quantity between two warehouses as one atomic unit:
//! debit leg at the source, credit leg at the destination, both sharing a
//! correlation id and summing to zero. Both legs commit inside a single
//! lock-ordered critical section, so no partial transfer is ever visible
//! outside it. If the credit leg fails after the debit leg committed, a
//! compensating adjustment reverses the debit before the locks drop.

use tracing::{error, info, warn};

use stockbook_core::{CorrelationId, InventoryError, InventoryResult, ProductId, WarehouseId};
use stockbook_ledger::{EntryCandidate, LedgerStore};

use crate::catalog::Catalog;
use crate::level::LevelBook;
use crate::locks::LockCoordinator;
use std::time::Duration;

pub(crate) struct TransferContext<'a, S: LedgerStore> {
    pub catalog: &'a Catalog,
    pub locks: &'a LockCoordinator,
    pub lock_timeout: Duration,
    pub ledger: &'a S,
    pub book: &'a LevelBook,
}

/// Execute a transfer of `quantity` units of `product` from `source` to
/// `destination`. Returns the correlation id shared by both legs.
pub(crate) fn execute<S: LedgerStore>(
    ctx: &TransferContext<'_, S>,
    product: ProductId,
    source: WarehouseId,
    destination: WarehouseId,
    quantity: i64,
    actor: Option<&str>,
) -> InventoryResult<CorrelationId> {
    if quantity <= 0 {
        return Err(InventoryError::NonPositiveQuantity {
            product,
            warehouse: source,
            quantity,
        });
    }
    if source == destination {
        return Err(InventoryError::SameWarehouse { warehouse: source });
    }

    // Both keys are taken together (sorted, all-or-nothing); nothing is
    // appended until both are held.
    let keys = [(product, source), (product, destination)];
    let _guard = ctx.locks.acquire(&keys, ctx.lock_timeout)?;

    // Validate both legs up front so the common failure modes (unknown
    // destination, insufficient stock) reject the transfer with zero
    // ledger records.
    let source_level = ctx.book.get(product, source);
    let mut debit = EntryCandidate::transfer_out(product, source, quantity);
    let mut credit = EntryCandidate::transfer_in(product, destination, quantity);
    crate::validate::admit(ctx.catalog, &source_level, &debit)?;
    crate::validate::admit(ctx.catalog, &ctx.book.get(product, destination), &credit)?;

    let correlation = CorrelationId::new();
    debit = debit.with_correlation(correlation);
    credit = credit.with_correlation(correlation);
    if let Some(actor) = actor {
        debit = debit.with_actor(actor);
        credit = credit.with_actor(actor);
    }

    let debit_entry = ctx.ledger.append(debit).map_err(InventoryError::from)?;
    ctx.book.apply(&debit_entry);

    match ctx.ledger.append(credit) {
        Ok(credit_entry) => {
            ctx.book.apply(&credit_entry);
            info!(
                %product,
                %source,
                %destination,
                quantity,
                %correlation,
                "transfer committed"
            );
            Ok(correlation)
        }
        Err(credit_err) => {
            // The ledger holds a lone debit leg; reverse it before anyone
            // can observe the imbalance.
            warn!(
                %product,
                %source,
                %destination,
                quantity,
                %correlation,
                error = %credit_err,
                "transfer credit leg failed, compensating debit leg"
            );
            let compensation = EntryCandidate::adjustment(product, source, quantity)
                .with_correlation(correlation)
                .with_reason("transfer compensation");
            match ctx.ledger.append(compensation) {
                Ok(entry) => {
                    ctx.book.apply(&entry);
                }
                Err(comp_err) => {
                    // Ledger unbalanced and unrecoverable from here; the
                    // operator has both failures in the log.
                    error!(
                        %correlation,
                        credit_error = %credit_err,
                        compensation_error = %comp_err,
                        "transfer compensation failed"
                    );
                    return Err(InventoryError::ledger_write(format!(
                        "credit leg failed ({credit_err}) and compensation failed ({comp_err})"
                    )));
                }
            }
            Err(InventoryError::from(credit_err))
        }
    }
}
