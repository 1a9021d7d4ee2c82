//! Task queue with background worker threads.
//!
//! `submit` is constant-time: it records the task, appends its id to the
//! FIFO, and wakes a worker. Everything slow happens on the worker side,
//! which holds no internal lock while the injected executor runs, so a
//! hung upstream call cannot starve status queries or further submits.

use std::collections::{HashMap, VecDeque};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use metrics::{counter, gauge, histogram};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::sync::{condvar_wait_timeout, mutex_lock};

use super::config::QueueConfig;
use super::task::Task;

const SOURCE: &str = "queue";

const METRIC_TASK_COMPLETED: &str = "backlot_task_completed_total";
const METRIC_TASK_FAILED: &str = "backlot_task_failed_total";
const METRIC_QUEUE_DEPTH: &str = "backlot_queue_depth";
const METRIC_TASK_RUN_MS: &str = "backlot_task_run_ms";

const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Boxed error type executors report failures with.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Externally supplied unit of work, routed by task kind.
///
/// Implementations must tolerate being called from a worker thread; the
/// queue guarantees no internal lock is held during the call.
pub trait TaskExecutor: Send + Sync + 'static {
    fn execute(&self, kind: &str, params: &Value) -> Result<Value, BoxError>;
}

impl<F> TaskExecutor for F
where
    F: Fn(&str, &Value) -> Result<Value, BoxError> + Send + Sync + 'static,
{
    fn execute(&self, kind: &str, params: &Value) -> Result<Value, BoxError> {
        self(kind, params)
    }
}

/// Why a submission was rejected.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("task queue is shutting down")]
    ShuttingDown,
    #[error("task queue is saturated ({depth} tasks pending)")]
    Saturated { depth: usize },
}

/// Result of a cooperative shutdown. `TimedOut` is a warning, not a
/// failure: workers are abandoned mid-task rather than killed, since
/// forcible termination would leave external side effects undefined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    Drained,
    TimedOut,
}

/// Operational snapshot for a status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct QueueSnapshot {
    /// Every retained task record: queued, processing, and terminal
    /// entries the caller has not evicted yet.
    pub tasks: HashMap<Uuid, Task>,
    /// Tasks waiting in the FIFO; the queue's backpressure signal.
    pub pending_depth: usize,
}

struct QueueState {
    pending: VecDeque<Uuid>,
    tasks: HashMap<Uuid, Task>,
    shutdown_requested: bool,
}

struct Shared {
    state: Mutex<QueueState>,
    work_available: Condvar,
    executor: Box<dyn TaskExecutor>,
    poll_interval: Duration,
}

/// In-process FIFO task queue backed by one or more OS worker threads.
///
/// With a single worker, tasks complete in submission order; with a pool
/// only submission-to-start order is guaranteed.
pub struct TaskQueue {
    shared: Arc<Shared>,
    config: QueueConfig,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskQueue {
    /// Build a queue around the injected executor. Workers are not
    /// spawned until [`TaskQueue::start`].
    pub fn new<E: TaskExecutor>(config: QueueConfig, executor: E) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState {
                    pending: VecDeque::new(),
                    tasks: HashMap::new(),
                    shutdown_requested: false,
                }),
                work_available: Condvar::new(),
                executor: Box::new(executor),
                poll_interval: config.poll_interval(),
            }),
            config,
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the configured worker threads. Warns and returns if workers
    /// are already running.
    pub fn start(&self) {
        let mut workers = mutex_lock(&self.workers, SOURCE, "start");
        if workers.iter().any(|handle| !handle.is_finished()) {
            warn!(target_module = SOURCE, "Task workers already running");
            return;
        }
        workers.clear();

        mutex_lock(&self.shared.state, SOURCE, "start.reset").shutdown_requested = false;

        for index in 0..self.config.workers_non_zero() {
            let shared = Arc::clone(&self.shared);
            let spawned = thread::Builder::new()
                .name(format!("backlot-worker-{index}"))
                .spawn(move || worker_loop(shared, index));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(reason) => error!(
                    target_module = SOURCE,
                    worker = index,
                    reason = %reason,
                    "Failed to spawn task worker"
                ),
            }
        }

        info!(
            target_module = SOURCE,
            workers = workers.len(),
            "Task workers started"
        );
    }

    /// Register a task and wake a worker. Constant-time and non-blocking
    /// beyond the internal lock; the entire point of the queue is that a
    /// caller's latency is decoupled from the job's.
    pub fn submit(&self, kind: impl Into<String>, params: Value) -> Result<Uuid, SubmitError> {
        let kind = kind.into();
        let mut state = mutex_lock(&self.shared.state, SOURCE, "submit");

        if state.shutdown_requested {
            return Err(SubmitError::ShuttingDown);
        }
        if let Some(max_pending) = self.config.max_pending {
            if state.pending.len() >= max_pending {
                return Err(SubmitError::Saturated {
                    depth: state.pending.len(),
                });
            }
        }

        let task = Task::new(kind.clone(), params);
        let id = task.id;
        state.tasks.insert(id, task);
        state.pending.push_back(id);
        gauge!(METRIC_QUEUE_DEPTH).set(state.pending.len() as f64);
        drop(state);

        self.shared.work_available.notify_one();
        info!(target_module = SOURCE, task_id = %id, kind = %kind, "Task submitted");
        Ok(id)
    }

    /// Read-only snapshot of one task record.
    pub fn status(&self, id: Uuid) -> Option<Task> {
        mutex_lock(&self.shared.state, SOURCE, "status")
            .tasks
            .get(&id)
            .cloned()
    }

    /// Snapshot of every retained record plus the current pending depth.
    pub fn list_active(&self) -> QueueSnapshot {
        let state = mutex_lock(&self.shared.state, SOURCE, "list_active");
        QueueSnapshot {
            tasks: state.tasks.clone(),
            pending_depth: state.pending.len(),
        }
    }

    /// Drop a terminal task record, returning whether one was removed.
    /// Queued and processing records are never evicted.
    pub fn evict(&self, id: Uuid) -> bool {
        let mut state = mutex_lock(&self.shared.state, SOURCE, "evict");
        let terminal = state
            .tasks
            .get(&id)
            .is_some_and(|task| task.status.is_terminal());
        if terminal {
            state.tasks.remove(&id);
        }
        terminal
    }

    /// Request cooperative shutdown and wait up to `timeout` for the
    /// workers to exit. Workers finish their in-flight task but dequeue
    /// nothing further; still-pending tasks stay `queued`.
    pub fn shutdown(&self, timeout: Duration) -> ShutdownOutcome {
        mutex_lock(&self.shared.state, SOURCE, "shutdown").shutdown_requested = true;
        self.shared.work_available.notify_all();

        let handles: Vec<JoinHandle<()>> = mutex_lock(&self.workers, SOURCE, "shutdown.take")
            .drain(..)
            .collect();

        let deadline = Instant::now() + timeout;
        let mut abandoned = 0_usize;
        for handle in handles {
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(JOIN_POLL_INTERVAL);
            }
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                // Dropping the handle detaches the thread; it will exit
                // on its own once the in-flight executor call returns.
                abandoned += 1;
            }
        }

        if abandoned > 0 {
            warn!(
                target_module = SOURCE,
                abandoned,
                timeout_ms = timeout.as_millis() as u64,
                "Shutdown grace elapsed with workers still busy; abandoning them"
            );
            ShutdownOutcome::TimedOut
        } else {
            info!(target_module = SOURCE, "Task queue stopped");
            ShutdownOutcome::Drained
        }
    }
}

fn worker_loop(shared: Arc<Shared>, worker_index: usize) {
    info!(target_module = SOURCE, worker = worker_index, "Task worker started");

    while let Some(id) = next_task(&shared) {
        let dispatch = {
            let mut state = mutex_lock(&shared.state, SOURCE, "worker.begin");
            state
                .tasks
                .get_mut(&id)
                .map(|task| {
                    task.begin();
                    (task.kind.clone(), task.params.clone())
                })
        };
        let Some((kind, params)) = dispatch else {
            continue;
        };

        let started = Instant::now();
        let outcome = catch_unwind(AssertUnwindSafe(|| shared.executor.execute(&kind, &params)));
        histogram!(METRIC_TASK_RUN_MS).record(started.elapsed().as_secs_f64() * 1000.0);

        let mut state = mutex_lock(&shared.state, SOURCE, "worker.finish");
        let Some(task) = state.tasks.get_mut(&id) else {
            continue;
        };
        match outcome {
            Ok(Ok(result)) => {
                task.complete(result);
                counter!(METRIC_TASK_COMPLETED).increment(1);
                info!(
                    target_module = SOURCE,
                    task_id = %id,
                    kind = %kind,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Task completed"
                );
            }
            Ok(Err(reason)) => {
                task.fail(reason.to_string());
                counter!(METRIC_TASK_FAILED).increment(1);
                error!(
                    target_module = SOURCE,
                    task_id = %id,
                    kind = %kind,
                    reason = %reason,
                    "Task failed"
                );
            }
            Err(panic) => {
                let summary = panic_summary(panic.as_ref());
                task.fail(summary.clone());
                counter!(METRIC_TASK_FAILED).increment(1);
                error!(
                    target_module = SOURCE,
                    task_id = %id,
                    kind = %kind,
                    reason = %summary,
                    "Task executor panicked"
                );
            }
        }
    }

    info!(target_module = SOURCE, worker = worker_index, "Task worker stopped");
}

/// Block until there is work or shutdown is requested. The wait uses the
/// bounded poll interval so the shutdown flag is observed promptly even
/// if a notify is missed.
fn next_task(shared: &Shared) -> Option<Uuid> {
    let mut state = mutex_lock(&shared.state, SOURCE, "worker.dequeue");
    loop {
        if state.shutdown_requested {
            return None;
        }
        if let Some(id) = state.pending.pop_front() {
            gauge!(METRIC_QUEUE_DEPTH).set(state.pending.len() as f64);
            return Some(id);
        }
        let (guard, _timed_out) = condvar_wait_timeout(
            &shared.work_available,
            state,
            shared.poll_interval,
            SOURCE,
            "worker.wait",
        );
        state = guard;
    }
}

fn panic_summary(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("task executor panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("task executor panicked: {message}")
    } else {
        "task executor panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::super::task::TaskStatus;
    use super::*;

    fn echo_executor() -> impl TaskExecutor {
        |_kind: &str, params: &Value| -> Result<Value, BoxError> { Ok(params.clone()) }
    }

    #[test]
    fn submit_registers_a_queued_task() {
        let queue = TaskQueue::new(QueueConfig::default(), echo_executor());

        let id = queue
            .submit("render", serde_json::json!({"n": 1}))
            .expect("submit");

        let task = queue.status(id).expect("task record");
        assert_eq!(task.status, TaskStatus::Queued);
        assert_eq!(task.kind, "render");
        assert_eq!(queue.list_active().pending_depth, 1);
    }

    #[test]
    fn unknown_id_has_no_status() {
        let queue = TaskQueue::new(QueueConfig::default(), echo_executor());
        assert!(queue.status(Uuid::new_v4()).is_none());
    }

    #[test]
    fn saturated_queue_rejects_submits() {
        let config = QueueConfig {
            max_pending: Some(1),
            ..Default::default()
        };
        let queue = TaskQueue::new(config, echo_executor());

        queue.submit("render", Value::Null).expect("first submit");
        let rejected = queue.submit("render", Value::Null);
        assert!(matches!(rejected, Err(SubmitError::Saturated { depth: 1 })));
    }

    #[test]
    fn submit_after_shutdown_is_rejected() {
        let queue = TaskQueue::new(QueueConfig::default(), echo_executor());
        queue.start();
        assert_eq!(
            queue.shutdown(Duration::from_secs(1)),
            ShutdownOutcome::Drained
        );

        let rejected = queue.submit("render", Value::Null);
        assert!(matches!(rejected, Err(SubmitError::ShuttingDown)));
    }

    #[test]
    fn evict_only_removes_terminal_tasks() {
        let queue = TaskQueue::new(QueueConfig::default(), echo_executor());

        // Worker not started: the task stays queued and must not be evictable.
        let id = queue.submit("render", Value::Null).expect("submit");
        assert!(!queue.evict(id));

        queue.start();
        wait_for_terminal(&queue, id);
        assert!(queue.evict(id));
        assert!(queue.status(id).is_none());
        queue.shutdown(Duration::from_secs(1));
    }

    #[test]
    fn start_twice_keeps_one_worker_set() {
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&counter);
        let queue = TaskQueue::new(
            QueueConfig::default(),
            move |_kind: &str, _params: &Value| -> Result<Value, BoxError> {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(Value::Null)
            },
        );

        queue.start();
        queue.start();

        let id = queue.submit("render", Value::Null).expect("submit");
        wait_for_terminal(&queue, id);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        queue.shutdown(Duration::from_secs(1));
    }

    fn wait_for_terminal(queue: &TaskQueue, id: Uuid) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if queue
                .status(id)
                .is_some_and(|task| task.status.is_terminal())
            {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("task {id} did not reach a terminal state in time");
    }
}
