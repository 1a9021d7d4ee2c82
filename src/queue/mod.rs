//! Backlot task queue.
//!
//! Lets a request handler hand minutes-long jobs to background worker
//! threads and return immediately with a task id. The actual work is an
//! injected [`TaskExecutor`]; this module owns only dispatch, lifecycle
//! bookkeeping, and cooperative shutdown.
//!
//! A single consumer (the default) provides natural backpressure for the
//! rate-limited, single-instance-expensive jobs this queue exists to run:
//! excess submissions wait longer in the FIFO, visible as
//! `pending_depth` in [`QueueSnapshot`], instead of spawning a thread per
//! request and exhausting the process.

mod config;
mod service;
mod task;

pub use config::QueueConfig;
pub use service::{BoxError, QueueSnapshot, ShutdownOutcome, SubmitError, TaskExecutor, TaskQueue};
pub use task::{Task, TaskStatus};
