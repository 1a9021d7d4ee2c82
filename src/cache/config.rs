//! Cache configuration.
//!
//! Controls the on-disk response cache via `backlot.toml`.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

// Default values for cache configuration
const DEFAULT_CACHE_DIR: &str = ".cache";
const DEFAULT_TTL_SECS: u64 = 3600;
const DEFAULT_MAX_SIZE_BYTES: u64 = 100 * 1024 * 1024;
const DEFAULT_EVICTION_FRACTION: f64 = 0.25;

/// Cache configuration from `backlot.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory holding one JSON record per cached key.
    pub dir: PathBuf,
    /// Default time-to-live for entries written without an override.
    pub default_ttl_secs: u64,
    /// Aggregate size bound; exceeding it triggers synchronous eviction.
    pub max_size_bytes: u64,
    /// Fraction of `max_size_bytes` freed per eviction pass.
    pub eviction_fraction: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_CACHE_DIR),
            default_ttl_secs: DEFAULT_TTL_SECS,
            max_size_bytes: DEFAULT_MAX_SIZE_BYTES,
            eviction_fraction: DEFAULT_EVICTION_FRACTION,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            dir: settings.dir.clone(),
            default_ttl_secs: settings.default_ttl.as_secs(),
            max_size_bytes: settings.max_size_bytes,
            eviction_fraction: settings.eviction_fraction,
        }
    }
}

impl CacheConfig {
    /// Default TTL as a [`Duration`].
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    /// Eviction fraction clamped to `(0, 1]`.
    ///
    /// A zero or negative fraction would make eviction a no-op and break
    /// the size bound; anything above 1 would always empty the store.
    pub fn eviction_fraction_clamped(&self) -> f64 {
        if self.eviction_fraction <= 0.0 {
            DEFAULT_EVICTION_FRACTION
        } else {
            self.eviction_fraction.min(1.0)
        }
    }

    /// Bytes one eviction pass must free, derived from the clamped fraction.
    pub fn eviction_target_bytes(&self) -> u64 {
        (self.max_size_bytes as f64 * self.eviction_fraction_clamped()).ceil() as u64
    }
}
