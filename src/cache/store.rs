//! Disk-backed response cache.
//!
//! One JSON record per key, addressed by a hex digest of the key so the
//! layout is filesystem-safe. An in-memory size index (rebuilt by scanning
//! the directory at startup) keeps `size_bytes()` O(1) and drives
//! oldest-first eviction whenever a write pushes the aggregate size past
//! the configured bound.
//!
//! Storage failures never surface to callers: a read problem degrades to
//! a miss, a write problem skips persistence. The cache shields a paid
//! upstream service; it must not turn a successful computation into an
//! error.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use std::{fs, io};

use metrics::{counter, gauge};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::sync::mutex_lock;

use super::config::CacheConfig;
use super::keys::file_digest;

const SOURCE: &str = "cache::store";

const METRIC_CACHE_HIT: &str = "backlot_cache_hit_total";
const METRIC_CACHE_MISS: &str = "backlot_cache_miss_total";
const METRIC_CACHE_EVICTED: &str = "backlot_cache_evicted_total";
const METRIC_CACHE_EXPIRED: &str = "backlot_cache_expired_total";
const METRIC_CACHE_SIZE: &str = "backlot_cache_size_bytes";

const RECORD_EXTENSION: &str = "json";

/// Self-describing on-disk unit: one per key.
#[derive(Debug, Serialize, Deserialize)]
struct CacheRecord {
    /// The original opaque key; file names only carry its digest.
    key: String,
    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,
    /// Per-entry TTL override in seconds; `None` defers to the store default.
    ttl_secs: Option<u64>,
    value: Value,
}

/// Size-index entry mirroring the record header, so expiry checks and
/// eviction ordering never require re-reading files.
#[derive(Debug, Clone)]
struct IndexEntry {
    size_bytes: u64,
    created_at: OffsetDateTime,
    ttl_secs: Option<u64>,
}

#[derive(Debug, Default)]
struct StoreState {
    index: HashMap<String, IndexEntry>,
    total_bytes: u64,
}

impl StoreState {
    fn insert(&mut self, key: String, entry: IndexEntry) {
        if let Some(previous) = self.index.insert(key, entry.clone()) {
            self.total_bytes = self.total_bytes.saturating_sub(previous.size_bytes);
        }
        self.total_bytes += entry.size_bytes;
    }

    fn remove(&mut self, key: &str) -> Option<IndexEntry> {
        let removed = self.index.remove(key);
        if let Some(entry) = removed.as_ref() {
            self.total_bytes = self.total_bytes.saturating_sub(entry.size_bytes);
        }
        removed
    }
}

/// Filesystem-backed cache with TTL expiry and size-bounded eviction.
///
/// All mutations and multi-step reads are serialized through one coarse
/// mutex: entry counts are small and local disk I/O is cheap relative to
/// the upstream network calls this cache shields, so per-key locking
/// would buy contention-freedom nobody needs.
pub struct CacheStore {
    dir: PathBuf,
    config: CacheConfig,
    state: Mutex<StoreState>,
}

impl CacheStore {
    /// Open (or create) a cache rooted at `config.dir`, rebuilding the
    /// size index by scanning existing records. Unreadable or corrupt
    /// records found during the scan are deleted.
    pub fn new(config: CacheConfig) -> Result<Self, io::Error> {
        fs::create_dir_all(&config.dir)?;

        let mut state = StoreState::default();
        for dir_entry in fs::read_dir(&config.dir)? {
            let dir_entry = dir_entry?;
            let path = dir_entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }

            match read_record(&path) {
                Ok((record, size_bytes)) => {
                    state.insert(
                        record.key,
                        IndexEntry {
                            size_bytes,
                            created_at: record.created_at,
                            ttl_secs: record.ttl_secs,
                        },
                    );
                }
                Err(reason) => {
                    warn!(
                        target_module = SOURCE,
                        path = %path.display(),
                        reason = %reason,
                        "Removing unreadable cache record found during index rebuild"
                    );
                    let _ = fs::remove_file(&path);
                }
            }
        }

        info!(
            target_module = SOURCE,
            dir = %config.dir.display(),
            entries = state.index.len(),
            total_bytes = state.total_bytes,
            "Cache store opened"
        );
        gauge!(METRIC_CACHE_SIZE).set(state.total_bytes as f64);

        Ok(Self {
            dir: config.dir.clone(),
            config,
            state: Mutex::new(state),
        })
    }

    /// Look up `key`, honoring the effective TTL: the caller's override
    /// if given, else the entry's stored TTL, else the store default.
    ///
    /// Expired entries are removed as a side effect of the read. Reads
    /// never touch recency state; eviction ordering is write-time only.
    pub fn get(&self, key: &str, ttl_override: Option<Duration>) -> Option<Value> {
        let mut state = mutex_lock(&self.state, SOURCE, "get");

        let Some(entry) = state.index.get(key) else {
            counter!(METRIC_CACHE_MISS).increment(1);
            return None;
        };

        let effective_ttl = ttl_override
            .or(entry.ttl_secs.map(Duration::from_secs))
            .unwrap_or_else(|| self.config.default_ttl());
        if is_expired(entry.created_at, effective_ttl, OffsetDateTime::now_utc()) {
            self.remove_locked(&mut state, key);
            counter!(METRIC_CACHE_EXPIRED).increment(1);
            counter!(METRIC_CACHE_MISS).increment(1);
            debug!(target_module = SOURCE, key, "Cache entry expired on read");
            return None;
        }

        match read_record(&self.entry_path(key)) {
            Ok((record, _)) => {
                counter!(METRIC_CACHE_HIT).increment(1);
                Some(record.value)
            }
            Err(reason) => {
                // Index said present but the record is gone or garbage;
                // drop it and report a miss.
                warn!(
                    target_module = SOURCE,
                    key,
                    reason = %reason,
                    "Removing corrupt cache record"
                );
                self.remove_locked(&mut state, key);
                counter!(METRIC_CACHE_MISS).increment(1);
                None
            }
        }
    }

    /// Typed convenience over [`CacheStore::get`]. A value that no longer
    /// deserializes as `T` is treated as a miss.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str, ttl_override: Option<Duration>) -> Option<T> {
        let value = self.get(key, ttl_override)?;
        match serde_json::from_value(value) {
            Ok(typed) => Some(typed),
            Err(reason) => {
                warn!(
                    target_module = SOURCE,
                    key,
                    reason = %reason,
                    "Cached value no longer matches the requested type; treating as miss"
                );
                None
            }
        }
    }

    /// Persist `value` under `key`, stamping `created_at = now` and the
    /// TTL override if one was supplied. Triggers synchronous eviction if
    /// the write pushes aggregate size past `max_size_bytes`.
    ///
    /// Never fails from the caller's perspective: serialization or I/O
    /// problems are logged and the entry is simply not cached.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl_override: Option<Duration>) {
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(reason) => {
                warn!(
                    target_module = SOURCE,
                    key,
                    reason = %reason,
                    "Skipping cache write: value is not JSON-serializable"
                );
                return;
            }
        };

        let record = CacheRecord {
            key: key.to_string(),
            created_at: OffsetDateTime::now_utc(),
            ttl_secs: ttl_override.map(|ttl| ttl.as_secs()),
            value,
        };
        let bytes = match serde_json::to_vec(&record) {
            Ok(bytes) => bytes,
            Err(reason) => {
                warn!(
                    target_module = SOURCE,
                    key,
                    reason = %reason,
                    "Skipping cache write: record serialization failed"
                );
                return;
            }
        };

        let mut state = mutex_lock(&self.state, SOURCE, "set");

        if let Err(reason) = fs::write(self.entry_path(key), &bytes) {
            warn!(
                target_module = SOURCE,
                key,
                reason = %reason,
                "Skipping cache write: storage I/O failed"
            );
            // A failed overwrite may have clobbered the previous record.
            self.remove_locked(&mut state, key);
            return;
        }

        state.insert(
            record.key,
            IndexEntry {
                size_bytes: bytes.len() as u64,
                created_at: record.created_at,
                ttl_secs: record.ttl_secs,
            },
        );

        if state.total_bytes > self.config.max_size_bytes {
            self.evict_locked(&mut state);
        }
        gauge!(METRIC_CACHE_SIZE).set(state.total_bytes as f64);
    }

    /// Remove `key` if present. Absent keys are a no-op, never an error.
    pub fn invalidate(&self, key: &str) {
        let mut state = mutex_lock(&self.state, SOURCE, "invalidate");
        self.remove_locked(&mut state, key);
        gauge!(METRIC_CACHE_SIZE).set(state.total_bytes as f64);
    }

    /// Current aggregate size from the running counter; no directory scan.
    pub fn size_bytes(&self) -> u64 {
        mutex_lock(&self.state, SOURCE, "size_bytes").total_bytes
    }

    /// Number of indexed entries.
    pub fn len(&self) -> usize {
        mutex_lock(&self.state, SOURCE, "len").index.len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Proactive sweep removing every entry whose TTL (stored, else the
    /// store default) has lapsed, independent of access pattern. Meant to
    /// run from a periodic scheduler, not the hot path. Returns the
    /// number of entries removed.
    pub fn cleanup_expired(&self) -> usize {
        let mut state = mutex_lock(&self.state, SOURCE, "cleanup_expired");
        let now = OffsetDateTime::now_utc();

        let expired: Vec<String> = state
            .index
            .iter()
            .filter(|(_, entry)| {
                let ttl = entry
                    .ttl_secs
                    .map(Duration::from_secs)
                    .unwrap_or_else(|| self.config.default_ttl());
                is_expired(entry.created_at, ttl, now)
            })
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.remove_locked(&mut state, key);
        }

        if !expired.is_empty() {
            counter!(METRIC_CACHE_EXPIRED).increment(expired.len() as u64);
            info!(
                target_module = SOURCE,
                removed = expired.len(),
                total_bytes = state.total_bytes,
                "Expired cache entries swept"
            );
        }
        gauge!(METRIC_CACHE_SIZE).set(state.total_bytes as f64);
        expired.len()
    }

    /// Remove every entry. Returns the number of entries removed.
    pub fn clear(&self) -> usize {
        let mut state = mutex_lock(&self.state, SOURCE, "clear");

        let keys: Vec<String> = state.index.keys().cloned().collect();
        for key in &keys {
            self.remove_locked(&mut state, key);
        }

        info!(target_module = SOURCE, removed = keys.len(), "Cache cleared");
        gauge!(METRIC_CACHE_SIZE).set(state.total_bytes as f64);
        keys.len()
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{RECORD_EXTENSION}", file_digest(key)))
    }

    fn remove_locked(&self, state: &mut StoreState, key: &str) {
        if state.remove(key).is_some() {
            let _ = fs::remove_file(self.entry_path(key));
        }
    }

    /// Evict oldest-first until at least `eviction_fraction × max_size_bytes`
    /// has been freed and the aggregate size is back under the bound, or
    /// the store is empty.
    ///
    /// Oldest-first rather than LRU: the store does not track read
    /// timestamps, which keeps the read path free of writes.
    fn evict_locked(&self, state: &mut StoreState) {
        let target = self.config.eviction_target_bytes();

        let mut candidates: Vec<(String, OffsetDateTime, u64)> = state
            .index
            .iter()
            .map(|(key, entry)| (key.clone(), entry.created_at, entry.size_bytes))
            .collect();
        candidates.sort_by_key(|(_, created_at, _)| *created_at);

        let mut freed: u64 = 0;
        let mut evicted: usize = 0;
        for (key, _, size_bytes) in candidates {
            if freed >= target && state.total_bytes <= self.config.max_size_bytes {
                break;
            }
            self.remove_locked(state, &key);
            freed += size_bytes;
            evicted += 1;
            debug!(target_module = SOURCE, key = %key, size_bytes, "Evicted cache entry");
        }

        counter!(METRIC_CACHE_EVICTED).increment(evicted as u64);
        info!(
            target_module = SOURCE,
            evicted,
            freed_bytes = freed,
            total_bytes = state.total_bytes,
            max_size_bytes = self.config.max_size_bytes,
            "Cache eviction pass finished"
        );
    }
}

fn is_expired(created_at: OffsetDateTime, ttl: Duration, now: OffsetDateTime) -> bool {
    // A TTL too large for the time arithmetic effectively never expires.
    match time::Duration::try_from(ttl) {
        Ok(ttl) => now - created_at >= ttl,
        Err(_) => false,
    }
}

fn read_record(path: &std::path::Path) -> Result<(CacheRecord, u64), String> {
    let bytes = fs::read(path).map_err(|err| err.to_string())?;
    let record: CacheRecord = serde_json::from_slice(&bytes).map_err(|err| err.to_string())?;
    Ok((record, bytes.len() as u64))
}
