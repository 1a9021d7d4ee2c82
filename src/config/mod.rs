//! Configuration layer: typed settings with layered precedence (defaults → file → env).
//!
//! Settings come from an optional `backlot.toml` next to the process,
//! overridden by `BACKLOT_*` environment variables (double underscore as
//! the section separator, e.g. `BACKLOT_CACHE__MAX_SIZE_BYTES`). Raw
//! values are deserialized leniently and validated into non-degenerate
//! typed settings in one place.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const LOCAL_CONFIG_BASENAME: &str = "backlot";
const ENV_PREFIX: &str = "BACKLOT";

const DEFAULT_CACHE_DIR: &str = ".cache";
const DEFAULT_CACHE_TTL_SECS: u64 = 3600;
const DEFAULT_CACHE_MAX_SIZE_BYTES: u64 = 100 * 1024 * 1024;
const DEFAULT_CACHE_EVICTION_FRACTION: f64 = 0.25;
const DEFAULT_QUEUE_WORKERS: usize = 1;
const DEFAULT_QUEUE_POLL_INTERVAL_MS: u64 = 100;
const DEFAULT_QUEUE_SHUTDOWN_GRACE_SECS: u64 = 5;
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_LOG_FORMAT: &str = "compact";

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub cache: CacheSettings,
    pub queue: QueueSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub dir: PathBuf,
    pub default_ttl: Duration,
    pub max_size_bytes: u64,
    pub eviction_fraction: f64,
}

#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub workers: NonZeroUsize,
    pub poll_interval: Duration,
    pub max_pending: Option<usize>,
    pub shutdown_grace: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment).
pub fn load() -> Result<Settings, LoadError> {
    load_from(None)
}

/// Load settings, optionally requiring an explicit configuration file in
/// place of the conventional `backlot.toml`.
pub fn load_from(config_file: Option<&Path>) -> Result<Settings, LoadError> {
    let mut builder =
        Config::builder().add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = config_file {
        builder = builder.add_source(File::from(path).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let raw: RawSettings = builder.build()?.try_deserialize()?;
    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    cache: RawCacheSettings,
    queue: RawQueueSettings,
    logging: RawLoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct RawCacheSettings {
    dir: PathBuf,
    default_ttl_secs: u64,
    max_size_bytes: u64,
    eviction_fraction: f64,
}

impl Default for RawCacheSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_CACHE_DIR),
            default_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            max_size_bytes: DEFAULT_CACHE_MAX_SIZE_BYTES,
            eviction_fraction: DEFAULT_CACHE_EVICTION_FRACTION,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct RawQueueSettings {
    workers: usize,
    poll_interval_ms: u64,
    max_pending: Option<usize>,
    shutdown_grace_secs: u64,
}

impl Default for RawQueueSettings {
    fn default() -> Self {
        Self {
            workers: DEFAULT_QUEUE_WORKERS,
            poll_interval_ms: DEFAULT_QUEUE_POLL_INTERVAL_MS,
            max_pending: None,
            shutdown_grace_secs: DEFAULT_QUEUE_SHUTDOWN_GRACE_SECS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct RawLoggingSettings {
    level: String,
    format: String,
}

impl Default for RawLoggingSettings {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            format: DEFAULT_LOG_FORMAT.to_string(),
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        Ok(Self {
            cache: build_cache_settings(raw.cache)?,
            queue: build_queue_settings(raw.queue)?,
            logging: build_logging_settings(raw.logging)?,
        })
    }
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    if cache.max_size_bytes == 0 {
        return Err(LoadError::invalid(
            "cache.max_size_bytes",
            "must be greater than zero",
        ));
    }
    if !(cache.eviction_fraction > 0.0 && cache.eviction_fraction <= 1.0) {
        return Err(LoadError::invalid(
            "cache.eviction_fraction",
            format!("{} is outside (0, 1]", cache.eviction_fraction),
        ));
    }

    Ok(CacheSettings {
        dir: cache.dir,
        default_ttl: Duration::from_secs(cache.default_ttl_secs),
        max_size_bytes: cache.max_size_bytes,
        eviction_fraction: cache.eviction_fraction,
    })
}

fn build_queue_settings(queue: RawQueueSettings) -> Result<QueueSettings, LoadError> {
    let workers = NonZeroUsize::new(queue.workers)
        .ok_or_else(|| LoadError::invalid("queue.workers", "must be at least 1"))?;
    if queue.poll_interval_ms == 0 {
        return Err(LoadError::invalid(
            "queue.poll_interval_ms",
            "must be greater than zero",
        ));
    }

    Ok(QueueSettings {
        workers,
        poll_interval: Duration::from_millis(queue.poll_interval_ms),
        max_pending: queue.max_pending,
        shutdown_grace: Duration::from_secs(queue.shutdown_grace_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = LevelFilter::from_str(&logging.level)
        .map_err(|_| LoadError::invalid("logging.level", format!("`{}`", logging.level)))?;

    let format = match logging.format.to_ascii_lowercase().as_str() {
        "json" => LogFormat::Json,
        "compact" => LogFormat::Compact,
        other => {
            return Err(LoadError::invalid(
                "logging.format",
                format!("`{other}` is not one of `json`, `compact`"),
            ));
        }
    };

    Ok(LoggingSettings { level, format })
}

#[cfg(test)]
mod tests;
