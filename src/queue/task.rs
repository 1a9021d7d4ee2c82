//! Task records and their lifecycle.
//!
//! A task moves `queued → processing → {completed, failed}` and never
//! leaves a terminal state. Records are retained in memory for the life
//! of the process (or until the caller evicts them); the underlying work
//! is non-idempotent, so nothing is persisted for auto-resume.

use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Submitted, waiting in the FIFO.
    Queued,
    /// Dequeued by a worker; the executor is running.
    Processing,
    /// Executor returned a value.
    Completed,
    /// Executor returned an error or panicked.
    Failed,
}

impl TaskStatus {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// One unit of asynchronous work and its observable history.
///
/// The id is a random UUID rather than a sequence number so a status
/// endpoint does not leak queue activity to whoever holds a handle.
#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub id: Uuid,
    /// Discriminator routed to the executor.
    pub kind: String,
    /// Opaque job input, serializable across the queue boundary.
    pub params: Value,
    pub status: TaskStatus,
    /// Populated on `completed`; mutually exclusive with `error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Populated on `failed`; mutually exclusive with `result`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub started_at: Option<OffsetDateTime>,
    #[serde(
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub completed_at: Option<OffsetDateTime>,
}

impl Task {
    pub(crate) fn new(kind: String, params: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            params,
            status: TaskStatus::Queued,
            result: None,
            error: None,
            created_at: OffsetDateTime::now_utc(),
            started_at: None,
            completed_at: None,
        }
    }

    /// `queued → processing`, stamping `started_at`.
    pub(crate) fn begin(&mut self) {
        if self.status.is_terminal() {
            return;
        }
        self.status = TaskStatus::Processing;
        self.started_at = Some(OffsetDateTime::now_utc());
    }

    /// `processing → completed`, recording the executor's return value.
    pub(crate) fn complete(&mut self, result: Value) {
        if self.status.is_terminal() {
            return;
        }
        self.status = TaskStatus::Completed;
        self.result = Some(result);
        self.completed_at = Some(OffsetDateTime::now_utc());
    }

    /// `processing → failed`, recording the captured error summary.
    pub(crate) fn fail(&mut self, error: String) {
        if self.status.is_terminal() {
            return;
        }
        self.status = TaskStatus::Failed;
        self.error = Some(error);
        self.completed_at = Some(OffsetDateTime::now_utc());
    }
}
