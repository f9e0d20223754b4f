use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use flightline_core::{AppError, AppResult, NonEmptyString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{GroupName, LockKey};

/// Lifecycle state of one background task execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Submitted and waiting for the guard.
    Pending,
    /// Lock granted and handler executing.
    Running,
    /// Handler finished successfully.
    Succeeded,
    /// Handler returned a failure.
    Failed,
    /// Guard refused the lock; nothing ran.
    Skipped,
}

impl TaskState {
    /// Returns stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    /// Parses storage value.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            "skipped" => Ok(Self::Skipped),
            _ => Err(AppError::Validation(format!("unknown task state '{value}'"))),
        }
    }

    /// Returns true once no further transition is possible.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }
}

/// Business failure raised by a task handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    kind: String,
    message: String,
}

impl TaskFailure {
    /// Creates a failure with an error kind and a human readable message.
    #[must_use]
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Returns the error kind.
    #[must_use]
    pub fn kind(&self) -> &str {
        self.kind.as_str()
    }

    /// Returns the error message.
    #[must_use]
    pub fn message(&self) -> &str {
        self.message.as_str()
    }
}

impl Display for TaskFailure {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for TaskFailure {}

/// Envelope placed on the work queue for one requested execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSubmission {
    /// Unique identifier of this submission.
    pub task_id: Uuid,
    /// Registered handler name.
    pub task_name: NonEmptyString,
    /// Group receiving the relay events.
    pub group: GroupName,
    /// Work item identity used for the lock key.
    pub item_key: Option<String>,
    /// Handler input.
    pub payload: Value,
    /// Number of times the submission was put back after a store outage.
    #[serde(default)]
    pub delivery_attempt: u32,
}

impl TaskSubmission {
    /// Creates a first-delivery submission.
    pub fn new(
        task_name: &str,
        group: GroupName,
        item_key: Option<String>,
        payload: Value,
    ) -> AppResult<Self> {
        Ok(Self {
            task_id: Uuid::new_v4(),
            task_name: NonEmptyString::new(task_name)?,
            group,
            item_key,
            payload,
            delivery_attempt: 0,
        })
    }

    /// Derives the single-flight key of this submission.
    pub fn lock_key(&self) -> AppResult<LockKey> {
        LockKey::derive(self.task_name.as_str(), self.item_key.as_deref())
    }

    /// Returns a copy scheduled for one more delivery.
    #[must_use]
    pub fn redelivered(&self) -> Self {
        Self {
            delivery_attempt: self.delivery_attempt.saturating_add(1),
            ..self.clone()
        }
    }
}

/// Terminal outcome of one granted execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WorkResult {
    /// Handler succeeded.
    Succeeded {
        /// Work item identity.
        hash_key: Option<String>,
        /// Completion time.
        completed_at: DateTime<Utc>,
    },
    /// Handler failed.
    Failed {
        /// Work item identity.
        hash_key: Option<String>,
        /// Error kind reported by the handler.
        kind: String,
        /// Error message reported by the handler.
        message: String,
        /// Failure time.
        failed_at: DateTime<Utc>,
    },
}

impl WorkResult {
    /// Returns the work item identity.
    #[must_use]
    pub fn hash_key(&self) -> Option<&str> {
        match self {
            Self::Succeeded { hash_key, .. } | Self::Failed { hash_key, .. } => hash_key.as_deref(),
        }
    }

    /// Returns the outcome timestamp.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Succeeded { completed_at, .. } => *completed_at,
            Self::Failed { failed_at, .. } => *failed_at,
        }
    }

    /// Returns the state this outcome corresponds to.
    #[must_use]
    pub fn state(&self) -> TaskState {
        match self {
            Self::Succeeded { .. } => TaskState::Succeeded,
            Self::Failed { .. } => TaskState::Failed,
        }
    }
}

/// Execution status visible to supervising infrastructure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatusRecord {
    /// Submission identifier.
    pub task_id: Uuid,
    /// Handler name.
    pub task_name: String,
    /// Current state.
    pub state: TaskState,
    /// Error kind when failed.
    pub error_kind: Option<String>,
    /// Error message when failed.
    pub error_message: Option<String>,
    /// Last transition time.
    pub updated_at: DateTime<Utc>,
}
