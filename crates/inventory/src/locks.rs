//! Per-(product, warehouse) lock coordination.
//!
//! Every mutating operation holds the lock for each key it touches.
//! Multi-key acquisition (transfers) is all-or-nothing: a waiter either
//! ends up holding every requested key or holds nothing, so overlapping
//! concurrent transfers cannot deadlock. Keys are sorted by (product,
//! warehouse) so guard bookkeeping is deterministic.

use std::collections::HashSet;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use tracing::debug;

use stockbook_core::{InventoryError, InventoryResult};

use crate::level::StockKey;

/// Coordinates exclusive access to (product, warehouse) keys.
#[derive(Debug, Default)]
pub struct LockCoordinator {
    held: Mutex<HashSet<StockKey>>,
    released: Condvar,
}

/// Scoped lock over one or more keys; released on drop (all exit paths).
#[derive(Debug)]
pub struct KeyLockGuard<'a> {
    coordinator: &'a LockCoordinator,
    keys: Vec<StockKey>,
}

impl LockCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire every key in `keys`, waiting up to `timeout`.
    ///
    /// Nothing is held until all keys are free, so an abandoned acquire
    /// (timeout) leaves no partial effect. Duplicate keys are collapsed.
    pub fn acquire(
        &self,
        keys: &[StockKey],
        timeout: Duration,
    ) -> InventoryResult<KeyLockGuard<'_>> {
        let mut wanted: Vec<StockKey> = keys.to_vec();
        wanted.sort();
        wanted.dedup();

        let deadline = Instant::now() + timeout;
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());

        loop {
            match wanted.iter().find(|k| held.contains(*k)) {
                None => {
                    held.extend(wanted.iter().copied());
                    return Ok(KeyLockGuard {
                        coordinator: self,
                        keys: wanted,
                    });
                }
                Some(&(product, warehouse)) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(InventoryError::LockTimeout { product, warehouse });
                    }
                    debug!(%product, %warehouse, "waiting for stock lock");
                    let (guard, wait) = self
                        .released
                        .wait_timeout(held, deadline - now)
                        .unwrap_or_else(|e| e.into_inner());
                    held = guard;
                    if wait.timed_out() {
                        // Re-check once; another holder may have released
                        // right at the deadline.
                        if wanted.iter().all(|k| !held.contains(k)) {
                            held.extend(wanted.iter().copied());
                            return Ok(KeyLockGuard {
                                coordinator: self,
                                keys: wanted,
                            });
                        }
                        return Err(InventoryError::LockTimeout { product, warehouse });
                    }
                }
            }
        }
    }
}

impl Drop for KeyLockGuard<'_> {
    fn drop(&mut self) {
        let mut held = self
            .coordinator
            .held
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        for key in &self.keys {
            held.remove(key);
        }
        self.coordinator.released.notify_all();
    }
}
