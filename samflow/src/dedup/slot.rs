//! A compare-and-swap "best candidate" slot.
//!
//! The Rust analogue of the original's `handle<shared_ptr<T>>`: concurrent
//! classification races many threads to publish the current best candidate
//! for a group, and a loser finds out who won and retries against that value,
//! mirroring `atomic_compare_exchange_strong`'s "expected gets overwritten on
//! failure" behavior.

use std::sync::Arc;

use arc_swap::ArcSwap;

pub struct Slot<T>(ArcSwap<T>);

impl<T> Slot<T> {
    pub fn new(value: Arc<T>) -> Self {
        Self(ArcSwap::from(value))
    }

    pub fn load(&self) -> Arc<T> {
        self.0.load_full()
    }

    /// Attempts to replace `current` with `new`, succeeding only if the slot
    /// still holds exactly `current` (pointer identity, not value equality).
    /// On failure, returns the slot's actual value so the caller can retry.
    pub fn compare_exchange(&self, current: &Arc<T>, new: Arc<T>) -> Result<(), Arc<T>> {
        let prev = self.0.compare_and_swap(current, new);
        let prev = Arc::clone(&prev);
        if Arc::ptr_eq(&prev, current) {
            Ok(())
        } else {
            Err(prev)
        }
    }
}
