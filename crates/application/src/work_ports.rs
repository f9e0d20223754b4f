use async_trait::async_trait;
use flightline_core::AppResult;
use flightline_domain::{TaskStatusRecord, TaskSubmission, WorkResult};
use uuid::Uuid;

/// Fire-and-forget submission side of the work queue.
#[async_trait]
pub trait WorkDispatcher: Send + Sync {
    /// Enqueues one submission.
    async fn submit(&self, submission: TaskSubmission) -> AppResult<()>;
}

/// Consuming side of the work queue.
#[async_trait]
pub trait WorkSource: Send + Sync {
    /// Pops the oldest pending submission without waiting.
    async fn next_submission(&self) -> AppResult<Option<TaskSubmission>>;
}

/// Execution status store read by supervising infrastructure.
#[async_trait]
pub trait TaskStatusStore: Send + Sync {
    /// Stores the latest status of one task.
    async fn set_status(&self, record: TaskStatusRecord) -> AppResult<()>;

    /// Returns the latest status of one task.
    async fn find_status(&self, task_id: Uuid) -> AppResult<Option<TaskStatusRecord>>;
}

/// Receipt recorder for finished work.
#[async_trait]
pub trait InteractionRecorder: Send + Sync {
    /// Records the outcome of one execution.
    async fn record(&self, result: &WorkResult) -> AppResult<()>;
}

/// Worker liveness tracking used for the connection status probe.
#[async_trait]
pub trait WorkerPresence: Send + Sync {
    /// Marks one worker as alive now.
    async fn record_heartbeat(&self, worker_id: &str) -> AppResult<()>;

    /// Returns true when any worker sent a heartbeat inside the active window.
    async fn is_reachable(&self) -> AppResult<bool>;
}
