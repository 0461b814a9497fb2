//! Poison-tolerant mutex access.
//!
//! Auth state must stay readable even if a task panicked while holding a
//! lock, so poisoning is logged and the guard recovered instead of
//! propagating the panic.

use std::sync::{Mutex, MutexGuard};

#[inline]
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::error!(
                target: "leasedesk::sync",
                "Mutex was poisoned; recovering possibly inconsistent state"
            );
            poisoned.into_inner()
        }
    }
}
