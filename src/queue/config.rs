//! Task queue configuration.

use std::time::Duration;

use serde::Deserialize;

// Default values for queue configuration
const DEFAULT_WORKERS: usize = 1;
const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 5;

/// Queue configuration from `backlot.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Background worker threads. The strict submission-order completion
    /// guarantee only holds at 1.
    pub workers: usize,
    /// Upper bound on how long a sleeping worker waits before re-checking
    /// the shutdown flag.
    pub poll_interval_ms: u64,
    /// Optional bound on pending depth; `None` accepts submissions
    /// without limit and relies on queue wait time as backpressure.
    pub max_pending: Option<usize>,
    /// Default grace period a caller should allow `shutdown` to drain.
    pub shutdown_grace_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_pending: None,
            shutdown_grace_secs: DEFAULT_SHUTDOWN_GRACE_SECS,
        }
    }
}

impl From<&crate::config::QueueSettings> for QueueConfig {
    fn from(settings: &crate::config::QueueSettings) -> Self {
        Self {
            workers: settings.workers.get(),
            poll_interval_ms: settings.poll_interval.as_millis() as u64,
            max_pending: settings.max_pending,
            shutdown_grace_secs: settings.shutdown_grace.as_secs(),
        }
    }
}

impl QueueConfig {
    /// Worker count clamped to at least one thread.
    pub fn workers_non_zero(&self) -> usize {
        self.workers.max(1)
    }

    /// Poll interval as a [`Duration`], clamped to at least 1ms so a
    /// zeroed config cannot spin a sleeping worker.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Shutdown grace as a [`Duration`].
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}
