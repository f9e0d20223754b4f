//! Guarded execution of background tasks with relay output.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use flightline_core::{AppError, AppResult};
use futures::FutureExt;
use flightline_domain::{
    RelayEvent, TaskFailure, TaskState, TaskStatusRecord, TaskSubmission, WorkResult,
};
use serde_json::Value;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    InteractionRecorder, RelayPublisher, SingleFlightGuard, SingleFlightOutcome, TaskStatusStore,
};

/// Handle given to a running task for emitting progress to its group.
pub struct TaskContext {
    submission: TaskSubmission,
    publisher: Arc<dyn RelayPublisher>,
    emitted: AtomicUsize,
}

impl TaskContext {
    pub(crate) fn new(submission: TaskSubmission, publisher: Arc<dyn RelayPublisher>) -> Self {
        Self {
            submission,
            publisher,
            emitted: AtomicUsize::new(0),
        }
    }

    /// Returns the handler input.
    #[must_use]
    pub fn payload(&self) -> &Value {
        &self.submission.payload
    }

    /// Returns the work item identity.
    #[must_use]
    pub fn hash_key(&self) -> Option<&str> {
        self.submission.item_key.as_deref()
    }

    /// Publishes one progress event and waits until it was handed off.
    ///
    /// Publish failures are logged and never fail the task.
    pub async fn emit_progress(&self, content: Value) {
        self.emitted.fetch_add(1, Ordering::Relaxed);
        publish_or_log(
            self.publisher.as_ref(),
            &self.submission,
            &RelayEvent::progress(content),
        )
        .await;
    }

    /// Returns how many progress events were emitted so far.
    #[must_use]
    pub fn emitted_count(&self) -> usize {
        self.emitted.load(Ordering::Relaxed)
    }
}

/// One kind of background work resolvable by name.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Returns the stable task name used in submissions and lock keys.
    fn name(&self) -> &str;

    /// Runs the task, emitting progress through the context.
    async fn run(&self, context: &TaskContext) -> Result<(), TaskFailure>;
}

/// Name-indexed set of task handlers.
#[derive(Clone, Default)]
pub struct TaskRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl TaskRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler under its own name, replacing any previous one.
    #[must_use]
    pub fn with_handler(mut self, handler: Arc<dyn TaskHandler>) -> Self {
        self.handlers.insert(handler.name().to_owned(), handler);
        self
    }

    /// Resolves a handler.
    #[must_use]
    pub fn get(&self, task_name: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(task_name).cloned()
    }

    /// Returns registered task names in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Outcome of one `TaskExecutor::execute` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskExecution {
    /// Submission identifier.
    pub task_id: Uuid,
    /// Terminal state.
    pub state: TaskState,
    /// Result of a granted execution; `None` when skipped.
    pub result: Option<WorkResult>,
}

/// Runs submissions under the single-flight guard.
#[derive(Clone)]
pub struct TaskExecutor {
    guard: SingleFlightGuard,
    registry: TaskRegistry,
    publisher: Arc<dyn RelayPublisher>,
    status_store: Arc<dyn TaskStatusStore>,
    recorder: Arc<dyn InteractionRecorder>,
}

impl TaskExecutor {
    /// Creates a task executor.
    #[must_use]
    pub fn new(
        guard: SingleFlightGuard,
        registry: TaskRegistry,
        publisher: Arc<dyn RelayPublisher>,
        status_store: Arc<dyn TaskStatusStore>,
        recorder: Arc<dyn InteractionRecorder>,
    ) -> Self {
        Self {
            guard,
            registry,
            publisher,
            status_store,
            recorder,
        }
    }

    /// Executes one submission.
    ///
    /// Returns `Skipped` without emitting any event when another execution
    /// holds the same key. A panicking handler counts as a failed task. Store outages surface as
    /// `AppError::StoreUnavailable` so the caller can redeliver.
    pub async fn execute(&self, submission: TaskSubmission) -> AppResult<TaskExecution> {
        let handler = self
            .registry
            .get(submission.task_name.as_str())
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "no task handler registered for '{}'",
                    submission.task_name
                ))
            })?;
        let lock_key = submission.lock_key()?;
        let task_id = submission.task_id;

        let outcome = self
            .guard
            .run(&lock_key, || self.run_granted(handler, submission.clone()))
            .await?;

        match outcome {
            SingleFlightOutcome::Executed(result) => Ok(TaskExecution {
                task_id,
                state: result.state(),
                result: Some(result),
            }),
            SingleFlightOutcome::Skipped => {
                info!(
                    task_id = %task_id,
                    lock_key = %lock_key,
                    "duplicate task dropped, another execution holds the lock"
                );
                self.mark_skipped(&submission).await;
                Ok(TaskExecution {
                    task_id,
                    state: TaskState::Skipped,
                    result: None,
                })
            }
        }
    }

    async fn run_granted(
        &self,
        handler: Arc<dyn TaskHandler>,
        submission: TaskSubmission,
    ) -> WorkResult {
        self.write_status(&submission, TaskState::Running, None).await;
        debug!(task_id = %submission.task_id, task_name = %submission.task_name, "task running");

        let context = TaskContext::new(submission.clone(), self.publisher.clone());
        let hash_key = submission.item_key.clone();

        let outcome = AssertUnwindSafe(handler.run(&context))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(TaskFailure::new("Panic", panic_message(panic.as_ref())))
            });

        let result = match outcome {
            Ok(()) => {
                let completed_at = Utc::now();
                publish_or_log(
                    self.publisher.as_ref(),
                    &submission,
                    &RelayEvent::completed(hash_key.as_deref(), completed_at),
                )
                .await;
                self.write_status(&submission, TaskState::Succeeded, None)
                    .await;
                info!(
                    task_id = %submission.task_id,
                    task_name = %submission.task_name,
                    hash_key = hash_key.as_deref().unwrap_or_default(),
                    progress_events = context.emitted_count(),
                    %completed_at,
                    "task completed"
                );
                WorkResult::Succeeded {
                    hash_key,
                    completed_at,
                }
            }
            Err(failure) => {
                let failed_at = Utc::now();
                error!(
                    task_id = %submission.task_id,
                    task_name = %submission.task_name,
                    hash_key = hash_key.as_deref().unwrap_or_default(),
                    error_kind = failure.kind(),
                    error = failure.message(),
                    "task failed"
                );
                publish_or_log(
                    self.publisher.as_ref(),
                    &submission,
                    &RelayEvent::failed(&failure, hash_key.as_deref()),
                )
                .await;
                self.write_status(&submission, TaskState::Failed, Some(&failure))
                    .await;
                WorkResult::Failed {
                    hash_key,
                    kind: failure.kind().to_owned(),
                    message: failure.message().to_owned(),
                    failed_at,
                }
            }
        };

        if let Err(error) = self.recorder.record(&result).await {
            warn!(
                task_id = %submission.task_id,
                error = %error,
                "failed to record task receipt"
            );
        }

        result
    }

    /// Records a skipped delivery unless the task already has a status.
    async fn mark_skipped(&self, submission: &TaskSubmission) {
        match self.status_store.find_status(submission.task_id).await {
            Ok(Some(existing)) => {
                debug!(
                    task_id = %submission.task_id,
                    state = existing.state.as_str(),
                    "keeping recorded status of redelivered task"
                );
            }
            Ok(None) => {
                self.write_status(submission, TaskState::Skipped, None).await;
            }
            Err(error) => {
                warn!(
                    task_id = %submission.task_id,
                    error = %error,
                    "failed to read task status, leaving it unchanged"
                );
            }
        }
    }

    async fn write_status(
        &self,
        submission: &TaskSubmission,
        state: TaskState,
        failure: Option<&TaskFailure>,
    ) {
        let record = TaskStatusRecord {
            task_id: submission.task_id,
            task_name: submission.task_name.as_str().to_owned(),
            state,
            error_kind: failure.map(|failure| failure.kind().to_owned()),
            error_message: failure.map(|failure| failure.message().to_owned()),
            updated_at: Utc::now(),
        };

        if let Err(error) = self.status_store.set_status(record).await {
            warn!(
                task_id = %submission.task_id,
                state = state.as_str(),
                error = %error,
                "failed to store task status"
            );
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "task handler panicked".to_owned()
    }
}

async fn publish_or_log(
    publisher: &dyn RelayPublisher,
    submission: &TaskSubmission,
    event: &RelayEvent,
) {
    if let Err(error) = publisher.publish(&submission.group, event).await {
        warn!(
            task_id = %submission.task_id,
            group = %submission.group,
            event_type = event.event_type(),
            error = %error,
            "failed to publish relay event"
        );
    }
}
