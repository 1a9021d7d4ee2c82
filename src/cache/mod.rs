//! Backlot cache system.
//!
//! A disk-backed cache for expensive, repeatable computations (upstream
//! generation calls, rendered payloads):
//!
//! - **TTL expiry**: lazy on read, plus a proactive [`CacheStore::cleanup_expired`] sweep
//! - **Size-bounded**: oldest-first eviction keeps aggregate size under a cap
//! - **Failure-silent**: storage problems degrade to misses, never errors
//!
//! ## Configuration
//!
//! Cache behavior is controlled via `backlot.toml`:
//!
//! ```toml
//! [cache]
//! dir = ".cache"
//! default_ttl_secs = 3600
//! max_size_bytes = 104857600
//! eviction_fraction = 0.25
//! ```

mod config;
mod keys;
mod memoize;
mod store;

pub use config::CacheConfig;
pub use keys::{KeyError, derive_key};
pub use memoize::memoized;
pub use store::CacheStore;
