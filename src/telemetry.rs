//! Tracing and metrics bootstrap.

use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use thiserror::Error;
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

static METRIC_DESCRIPTIONS: Once = Once::new();

#[derive(Debug, Error)]
#[error("telemetry initialization failed: {0}")]
pub struct TelemetryError(String);

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), TelemetryError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| TelemetryError(format!("failed to install tracing subscriber: {err}")))
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "backlot_cache_hit_total",
            Unit::Count,
            "Total number of cache hits."
        );
        describe_counter!(
            "backlot_cache_miss_total",
            Unit::Count,
            "Total number of cache misses, including expired and corrupt reads."
        );
        describe_counter!(
            "backlot_cache_evicted_total",
            Unit::Count,
            "Total number of cache entries evicted to restore the size bound."
        );
        describe_counter!(
            "backlot_cache_expired_total",
            Unit::Count,
            "Total number of cache entries removed because their TTL lapsed."
        );
        describe_gauge!(
            "backlot_cache_size_bytes",
            Unit::Bytes,
            "Current aggregate size of stored cache records."
        );
        describe_counter!(
            "backlot_task_completed_total",
            Unit::Count,
            "Total number of tasks that reached the completed state."
        );
        describe_counter!(
            "backlot_task_failed_total",
            Unit::Count,
            "Total number of tasks that reached the failed state."
        );
        describe_gauge!(
            "backlot_queue_depth",
            Unit::Count,
            "Current number of task ids waiting in the FIFO."
        );
        describe_histogram!(
            "backlot_task_run_ms",
            Unit::Milliseconds,
            "Wall-clock executor time per task."
        );
    });
}
