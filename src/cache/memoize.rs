//! Memoization wrapper over the cache store.
//!
//! Wraps an expensive function, keyed by operation name plus arguments:
//! derive a stable key, consult the store, run the computation only on a
//! miss, and persist successful results. The store is never asked to
//! hold an error.

use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::keys::derive_key;
use super::store::CacheStore;

const SOURCE: &str = "cache::memoize";

/// Run `compute` through the cache: a fresh result is cached under a key
/// derived from `op` and `args`, and later calls with the same `op` and
/// equal `args` are served from disk until the entry expires.
///
/// `compute` runs without any cache lock held, so a slow upstream call
/// never starves concurrent cache traffic. Failures pass straight
/// through and leave the cache untouched.
pub fn memoized<A, T, E, F>(
    store: &CacheStore,
    op: &str,
    args: &A,
    ttl_override: Option<Duration>,
    compute: F,
) -> Result<T, E>
where
    A: Serialize + ?Sized,
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Result<T, E>,
{
    let key = match derive_key(op, args) {
        Ok(key) => key,
        Err(reason) => {
            // Unkeyable arguments: skip caching, still do the work.
            warn!(
                target_module = SOURCE,
                op,
                reason = %reason,
                "Could not derive cache key; running computation uncached"
            );
            return compute();
        }
    };

    if let Some(hit) = store.get_as::<T>(&key, ttl_override) {
        debug!(target_module = SOURCE, op, "Memoized call served from cache");
        return Ok(hit);
    }

    debug!(target_module = SOURCE, op, "Memoized call missed; computing");
    let result = compute()?;
    store.set(&key, &result, ttl_override);
    Ok(result)
}
