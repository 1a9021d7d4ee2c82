//! Poison-tolerant wrappers over std synchronization primitives.
//!
//! Both the cache store and the task queue guard their shared state with a
//! single coarse mutex. A panic while holding one of those locks poisons
//! it; these helpers recover the guard and log instead of propagating,
//! so one panicking caller cannot take the whole component down with it.

use std::sync::{Condvar, Mutex, MutexGuard, WaitTimeoutResult};
use std::time::Duration;

use tracing::warn;

/// Acquire a mutex, recovering from poisoning instead of propagating the
/// panic. The guarded state may be stale after recovery but the component
/// must keep serving.
pub(crate) fn mutex_lock<'a, T>(
    lock: &'a Mutex<T>,
    target: &'static str,
    op: &'static str,
) -> MutexGuard<'a, T> {
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!(
                op,
                target_module = target,
                lock_kind = "mutex.lock",
                result = "poisoned_recovered",
                hint = "state may be stale after panic in another thread",
                "Recovered from poisoned lock"
            );
            poisoned.into_inner()
        }
    }
}

/// Block on a condvar with a bounded timeout, recovering the guard if the
/// lock was poisoned while this thread slept.
pub(crate) fn condvar_wait_timeout<'a, T>(
    condvar: &Condvar,
    guard: MutexGuard<'a, T>,
    timeout: Duration,
    target: &'static str,
    op: &'static str,
) -> (MutexGuard<'a, T>, WaitTimeoutResult) {
    match condvar.wait_timeout(guard, timeout) {
        Ok(pair) => pair,
        Err(poisoned) => {
            warn!(
                op,
                target_module = target,
                lock_kind = "condvar.wait_timeout",
                result = "poisoned_recovered",
                hint = "state may be stale after panic in another thread",
                "Recovered from poisoned lock"
            );
            poisoned.into_inner()
        }
    }
}
