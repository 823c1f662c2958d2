//! Stock reservations (holds).
//!
//! A hold reduces availability without a ledger movement. Committing a
//! hold converts it into an issue entry; releasing or expiring it simply
//! restores availability. Commit and expiry race through the same per-key
//! lock in the engine: whichever acquires it first wins, and the table's
//! state machine turns the loser into `ReservationExpired` /
//! `AlreadyCommitted`.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockbook_core::{InventoryError, InventoryResult, ProductId, ReservationId, WarehouseId};

/// Reservation lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationState {
    Active,
    Committed,
    Released,
    Expired,
}

/// A tentative allocation of stock for a pending order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub product: ProductId,
    pub warehouse: WarehouseId,
    pub quantity: i64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub state: ReservationState,
}

impl Reservation {
    pub fn new(
        product: ProductId,
        warehouse: WarehouseId,
        quantity: i64,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ReservationId::new(),
            product,
            warehouse,
            quantity,
            created_at,
            expires_at,
            state: ReservationState::Active,
        }
    }

    pub fn is_past_due(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Table of reservations with state-machine transitions.
///
/// The table only mutates state; the engine owns the corresponding
/// reserved-quantity bookkeeping in the level book, and calls every
/// transition with the reservation's key lock held.
#[derive(Debug, Default)]
pub struct ReservationTable {
    inner: RwLock<HashMap<ReservationId, Reservation>>,
}

impl ReservationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, reservation: Reservation) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.insert(reservation.id, reservation);
    }

    pub fn get(&self, id: ReservationId) -> Option<Reservation> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.get(&id).cloned()
    }

    /// If the reservation is active but past due, mark it expired and
    /// return its former shape so the caller can restore availability.
    pub fn expire_if_due(&self, id: ReservationId, now: DateTime<Utc>) -> Option<Reservation> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let res = inner.get_mut(&id)?;
        if res.state == ReservationState::Active && res.is_past_due(now) {
            let snapshot = res.clone();
            res.state = ReservationState::Expired;
            return Some(snapshot);
        }
        None
    }

    /// The reservation, provided it is still active and within its ttl.
    pub fn require_active(&self, id: ReservationId, now: DateTime<Utc>) -> InventoryResult<Reservation> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let res = inner
            .get(&id)
            .ok_or(InventoryError::ReservationNotFound { reservation: id })?;
        match res.state {
            ReservationState::Active if !res.is_past_due(now) => Ok(res.clone()),
            ReservationState::Active | ReservationState::Expired => {
                Err(InventoryError::ReservationExpired { reservation: id })
            }
            ReservationState::Committed => {
                Err(InventoryError::AlreadyCommitted { reservation: id })
            }
            ReservationState::Released => {
                Err(InventoryError::ReservationNotFound { reservation: id })
            }
        }
    }

    pub fn mark_committed(&self, id: ReservationId) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if let Some(res) = inner.get_mut(&id) {
            res.state = ReservationState::Committed;
        }
    }

    /// Release transition. Returns the reservation if it was active (the
    /// caller restores availability); terminal states are a no-op, making
    /// release idempotent.
    pub fn release(&self, id: ReservationId) -> InventoryResult<Option<Reservation>> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let res = inner
            .get_mut(&id)
            .ok_or(InventoryError::ReservationNotFound { reservation: id })?;
        match res.state {
            ReservationState::Active => {
                let snapshot = res.clone();
                res.state = ReservationState::Released;
                Ok(Some(snapshot))
            }
            _ => Ok(None),
        }
    }

    /// Active reservations past their ttl (candidates for the sweep; the
    /// engine re-checks each one under its key lock).
    pub fn expired_candidates(&self, now: DateTime<Utc>) -> Vec<Reservation> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner
            .values()
            .filter(|r| r.state == ReservationState::Active && r.is_past_due(now))
            .cloned()
            .collect()
    }

    /// All currently active holds (used to restore reserved quantities
    /// after a level rebuild).
    pub fn active(&self) -> Vec<Reservation> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner
            .values()
            .filter(|r| r.state == ReservationState::Active)
            .cloned()
            .collect()
    }

    pub fn active_count(&self) -> usize {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner
            .values()
            .filter(|r| r.state == ReservationState::Active)
            .count()
    }
}
