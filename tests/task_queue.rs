//! End-to-end task queue behavior with a single worker: lifecycle
//! monotonicity, non-blocking submission, failure isolation, and the
//! completion-order guarantee.

use std::thread::sleep;
use std::time::{Duration, Instant};

use backlot::queue::{
    BoxError, QueueConfig, ShutdownOutcome, TaskQueue, TaskStatus,
};
use serde_json::{Value, json};
use uuid::Uuid;

const DEFAULT_DEADLINE: Duration = Duration::from_secs(10);

/// Executor used across these tests: routes on `kind`.
///
/// - `"slow"` sleeps for `params.sleep_ms` then echoes `params.label`
/// - `"fail"` returns an error
/// - `"panic"` panics
/// - anything else echoes its params immediately
fn pipeline_executor(kind: &str, params: &Value) -> Result<Value, BoxError> {
    match kind {
        "slow" => {
            let sleep_ms = params["sleep_ms"].as_u64().unwrap_or(100);
            sleep(Duration::from_millis(sleep_ms));
            Ok(json!({ "label": params["label"] }))
        }
        "fail" => Err("upstream upload rejected the media".into()),
        "panic" => panic!("executor blew up"),
        _ => Ok(params.clone()),
    }
}

fn single_worker_queue() -> TaskQueue {
    let queue = TaskQueue::new(QueueConfig::default(), pipeline_executor);
    queue.start();
    queue
}

fn wait_for_terminal(queue: &TaskQueue, id: Uuid) -> TaskStatus {
    let deadline = Instant::now() + DEFAULT_DEADLINE;
    while Instant::now() < deadline {
        if let Some(task) = queue.status(id) {
            if task.status.is_terminal() {
                return task.status;
            }
        }
        sleep(Duration::from_millis(5));
    }
    panic!("task {id} did not reach a terminal state in time");
}

#[test]
fn observed_statuses_never_reverse() {
    let queue = single_worker_queue();
    let id = queue
        .submit("slow", json!({ "sleep_ms": 200, "label": "a" }))
        .expect("submit");

    // Sample the status until terminal; the deduplicated sequence must be
    // a subsequence of queued → processing → terminal.
    let order = [
        TaskStatus::Queued,
        TaskStatus::Processing,
        TaskStatus::Completed,
    ];
    let mut last_rank = 0;
    let deadline = Instant::now() + DEFAULT_DEADLINE;
    loop {
        let status = queue.status(id).expect("record is retained").status;
        let rank = order
            .iter()
            .position(|s| *s == status)
            .expect("only lifecycle states are observable");
        assert!(
            rank >= last_rank,
            "status reversed from {:?} to {:?}",
            order[last_rank],
            status
        );
        last_rank = rank;

        if status.is_terminal() {
            break;
        }
        assert!(Instant::now() < deadline, "task never finished");
        sleep(Duration::from_millis(10));
    }

    queue.shutdown(Duration::from_secs(1));
}

#[test]
fn submit_returns_long_before_a_slow_executor_finishes() {
    let queue = single_worker_queue();

    let started = Instant::now();
    let id = queue
        .submit("slow", json!({ "sleep_ms": 1500, "label": "slow" }))
        .expect("submit");
    let submit_elapsed = started.elapsed();

    assert!(
        submit_elapsed < Duration::from_millis(250),
        "submit took {submit_elapsed:?}, expected bounded small time"
    );
    // The job is still running (or waiting); it cannot be terminal yet.
    let status = queue.status(id).expect("record").status;
    assert!(!status.is_terminal());

    wait_for_terminal(&queue, id);
    queue.shutdown(Duration::from_secs(1));
}

#[test]
fn one_failing_task_does_not_affect_the_next() {
    let queue = single_worker_queue();

    let failing = queue.submit("fail", Value::Null).expect("submit j1");
    let succeeding = queue.submit("echo", json!("ok")).expect("submit j2");

    assert_eq!(wait_for_terminal(&queue, failing), TaskStatus::Failed);
    assert_eq!(wait_for_terminal(&queue, succeeding), TaskStatus::Completed);

    let failed = queue.status(failing).expect("j1 record");
    assert!(failed.error.as_deref().unwrap_or("").contains("upload"));
    assert!(failed.result.is_none());

    let completed = queue.status(succeeding).expect("j2 record");
    assert_eq!(completed.result, Some(json!("ok")));
    assert!(completed.error.is_none());

    queue.shutdown(Duration::from_secs(1));
}

#[test]
fn a_panicking_executor_is_captured_as_failure() {
    let queue = single_worker_queue();

    let panicking = queue.submit("panic", Value::Null).expect("submit");
    let following = queue.submit("echo", json!(42)).expect("submit follow-up");

    assert_eq!(wait_for_terminal(&queue, panicking), TaskStatus::Failed);
    let record = queue.status(panicking).expect("record");
    assert!(record.error.as_deref().unwrap_or("").contains("panicked"));

    // The worker survived and processed the next task.
    assert_eq!(wait_for_terminal(&queue, following), TaskStatus::Completed);

    queue.shutdown(Duration::from_secs(1));
}

#[test]
fn three_slow_tasks_complete_in_submission_order() {
    let queue = single_worker_queue();

    let ids: Vec<Uuid> = ["first", "second", "third"]
        .iter()
        .map(|label| {
            queue
                .submit("slow", json!({ "sleep_ms": 500, "label": label }))
                .expect("submit")
        })
        .collect();

    // Once the worker has picked up the first task, exactly two remain in
    // the FIFO: one processing, two queued.
    let deadline = Instant::now() + DEFAULT_DEADLINE;
    loop {
        let snapshot = queue.list_active();
        let processing = snapshot
            .tasks
            .values()
            .filter(|task| task.status == TaskStatus::Processing)
            .count();
        if processing == 1 {
            assert_eq!(snapshot.pending_depth, 2);
            break;
        }
        assert!(Instant::now() < deadline, "worker never started task one");
        sleep(Duration::from_millis(5));
    }

    for (id, label) in ids.iter().zip(["first", "second", "third"]) {
        assert_eq!(wait_for_terminal(&queue, *id), TaskStatus::Completed);
        let record = queue.status(*id).expect("record");
        assert_eq!(record.result, Some(json!({ "label": label })));
    }

    // Completion order matches submission order with a single worker.
    let completed_at: Vec<_> = ids
        .iter()
        .map(|id| {
            queue
                .status(*id)
                .expect("record")
                .completed_at
                .expect("terminal tasks carry completed_at")
        })
        .collect();
    assert!(completed_at[0] <= completed_at[1]);
    assert!(completed_at[1] <= completed_at[2]);

    queue.shutdown(Duration::from_secs(1));
}

#[test]
fn shutdown_drains_the_in_flight_task_but_dequeues_nothing_more() {
    let queue = single_worker_queue();

    let running = queue
        .submit("slow", json!({ "sleep_ms": 200, "label": "running" }))
        .expect("submit running");
    // Give the worker time to pick it up.
    sleep(Duration::from_millis(50));
    let parked = queue
        .submit("slow", json!({ "sleep_ms": 200, "label": "parked" }))
        .expect("submit parked");

    assert_eq!(queue.shutdown(Duration::from_secs(5)), ShutdownOutcome::Drained);

    // The in-flight task finished; the parked one was never dequeued.
    assert_eq!(
        queue.status(running).expect("running record").status,
        TaskStatus::Completed
    );
    assert_eq!(
        queue.status(parked).expect("parked record").status,
        TaskStatus::Queued
    );
}

#[test]
fn shutdown_reports_timeout_when_a_task_outlives_the_grace() {
    let queue = single_worker_queue();

    queue
        .submit("slow", json!({ "sleep_ms": 2000, "label": "straggler" }))
        .expect("submit");
    // Give the worker time to pick it up.
    sleep(Duration::from_millis(50));

    assert_eq!(
        queue.shutdown(Duration::from_millis(100)),
        ShutdownOutcome::TimedOut
    );
}
