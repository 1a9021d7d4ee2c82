use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use super::*;

#[test]
fn defaults_resolve_without_any_sources() {
    let settings = Settings::from_raw(RawSettings::default()).expect("defaults are valid");

    assert_eq!(settings.cache.dir, PathBuf::from(".cache"));
    assert_eq!(settings.cache.default_ttl, Duration::from_secs(3600));
    assert_eq!(settings.cache.max_size_bytes, 100 * 1024 * 1024);
    assert_eq!(settings.cache.eviction_fraction, 0.25);

    assert_eq!(settings.queue.workers, NonZeroUsize::MIN);
    assert_eq!(settings.queue.poll_interval, Duration::from_millis(100));
    assert_eq!(settings.queue.max_pending, None);
    assert_eq!(settings.queue.shutdown_grace, Duration::from_secs(5));

    assert!(matches!(settings.logging.format, LogFormat::Compact));
}

#[test]
fn zero_max_size_is_rejected() {
    let raw = RawSettings {
        cache: RawCacheSettings {
            max_size_bytes: 0,
            ..Default::default()
        },
        ..Default::default()
    };

    let error = Settings::from_raw(raw).expect_err("zero cap must be rejected");
    assert!(matches!(
        error,
        LoadError::Invalid {
            key: "cache.max_size_bytes",
            ..
        }
    ));
}

#[test]
fn out_of_range_eviction_fraction_is_rejected() {
    for fraction in [0.0, -0.5, 1.5] {
        let raw = RawSettings {
            cache: RawCacheSettings {
                eviction_fraction: fraction,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(Settings::from_raw(raw).is_err(), "fraction {fraction}");
    }
}

#[test]
fn zero_workers_are_rejected() {
    let raw = RawSettings {
        queue: RawQueueSettings {
            workers: 0,
            ..Default::default()
        },
        ..Default::default()
    };

    let error = Settings::from_raw(raw).expect_err("zero workers must be rejected");
    assert!(matches!(
        error,
        LoadError::Invalid {
            key: "queue.workers",
            ..
        }
    ));
}

#[test]
fn log_format_parses_case_insensitively() {
    let raw = RawSettings {
        logging: RawLoggingSettings {
            format: "JSON".to_string(),
            ..Default::default()
        },
        ..Default::default()
    };

    let settings = Settings::from_raw(raw).expect("format should parse");
    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn unknown_log_level_is_rejected() {
    let raw = RawSettings {
        logging: RawLoggingSettings {
            level: "chatty".to_string(),
            ..Default::default()
        },
        ..Default::default()
    };

    assert!(Settings::from_raw(raw).is_err());
}
