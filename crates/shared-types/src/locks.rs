//! # Keyed Locks
//!
//! Per-key mutual exclusion for event application. One `KeyedLocks` table
//! exists per lock namespace (ballots, Xmsgs, nonce pairs). Guards are owned
//! (`Arc`-backed) so a [`crate::StoreTx`] can carry them until commit.

use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};
use std::collections::HashMap;
use std::sync::Arc;

/// Owned guard over one key's mutex.
pub type KeyGuard = ArcMutexGuard<RawMutex, ()>;

/// Idle slots are swept once the table grows past this many entries.
const SWEEP_THRESHOLD: usize = 4096;

/// Table of per-key mutexes.
#[derive(Default)]
pub struct KeyedLocks {
    slots: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the mutex for `key` is acquired.
    ///
    /// Not re-entrant: callers go through [`crate::StoreTx::lock`], which
    /// skips keys the transaction already holds.
    pub fn acquire(&self, key: &str) -> KeyGuard {
        let slot = {
            let mut slots = self.slots.lock();
            if slots.len() >= SWEEP_THRESHOLD {
                // A slot referenced only by the table is neither held nor awaited.
                slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            }
            Arc::clone(
                slots
                    .entry(key.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };
        slot.lock_arc()
    }

    /// Number of tracked slots.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    /// Whether no slot is tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
