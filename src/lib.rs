//! Concurrency core for a content-automation pipeline.
//!
//! Two independent components, each guarding its own shared state:
//!
//! - [`cache`]: a disk-backed response cache with TTL expiry and
//!   size-bounded, oldest-first eviction. Shields a paid generation
//!   service from redundant calls; storage failures degrade to misses.
//! - [`queue`]: an in-process task queue that lets a request handler hand
//!   minutes-long jobs to background worker threads and return a task id
//!   immediately. The work itself is an injected [`queue::TaskExecutor`].
//!
//! The rest of the pipeline (content assembly, rendering, upload) lives
//! outside this crate and interacts with it only as "a cacheable
//! key/value computation" and "a slow, fallible unit of work".
//!
//! ```no_run
//! use backlot::cache::{CacheConfig, CacheStore};
//! use backlot::queue::{BoxError, QueueConfig, TaskQueue};
//! use serde_json::Value;
//!
//! # fn demo() -> Result<(), std::io::Error> {
//! let cache = CacheStore::new(CacheConfig::default())?;
//! cache.set("greeting", "hello", None);
//!
//! let queue = TaskQueue::new(
//!     QueueConfig::default(),
//!     |kind: &str, params: &Value| -> Result<Value, BoxError> {
//!         Ok(serde_json::json!({ "kind": kind, "echo": params }))
//!     },
//! );
//! queue.start();
//! let id = queue.submit("render", serde_json::json!({ "topic": "rust" }));
//! # let _ = id;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod queue;
mod sync;
pub mod telemetry;

pub use cache::{CacheConfig, CacheStore, derive_key, memoized};
pub use queue::{
    BoxError, QueueConfig, QueueSnapshot, ShutdownOutcome, SubmitError, Task, TaskExecutor,
    TaskQueue, TaskStatus,
};
