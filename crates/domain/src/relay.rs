use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::TaskFailure;

/// Event type of incremental task output.
pub const PROGRESS_EVENT: &str = "progress";
/// Event type sent to the group when a request was accepted for execution.
pub const ACCEPTED_EVENT: &str = "accepted_task";
/// Event type sent to the requesting session when its payload could not be queued.
pub const REJECTED_EVENT: &str = "rejected_task";
/// Event type of the terminal success marker.
pub const COMPLETED_EVENT: &str = "completed_task";
/// Event type of the terminal failure marker.
pub const FAILED_EVENT: &str = "failed_task";

/// Message produced by background work and fanned out to a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayEvent {
    event_type: String,
    content: Value,
}

impl RelayEvent {
    /// Creates an event with an arbitrary type.
    #[must_use]
    pub fn new(event_type: impl Into<String>, content: Value) -> Self {
        Self {
            event_type: event_type.into(),
            content,
        }
    }

    /// Creates one progress event.
    #[must_use]
    pub fn progress(content: Value) -> Self {
        Self::new(PROGRESS_EVENT, content)
    }

    /// Creates the acceptance notice for a submitted payload.
    #[must_use]
    pub fn accepted(payload: &str, hash_key: &str) -> Self {
        Self::new(
            ACCEPTED_EVENT,
            json!({ "payload": payload, "hash_key": hash_key }),
        )
    }

    /// Creates the rejection notice for a payload that was never queued.
    #[must_use]
    pub fn rejected(hash_key: &str, reason: &str) -> Self {
        Self::new(
            REJECTED_EVENT,
            json!({ "hash_key": hash_key, "reason": reason }),
        )
    }

    /// Creates the success marker.
    #[must_use]
    pub fn completed(hash_key: Option<&str>, completed_at: DateTime<Utc>) -> Self {
        Self::new(
            COMPLETED_EVENT,
            json!({ "hash_key": hash_key, "completed_at": completed_at }),
        )
    }

    /// Creates the failure marker.
    #[must_use]
    pub fn failed(failure: &TaskFailure, hash_key: Option<&str>) -> Self {
        Self::new(
            FAILED_EVENT,
            json!({
                "kind": failure.kind(),
                "message": failure.message(),
                "hash_key": hash_key,
            }),
        )
    }

    /// Returns the event type.
    #[must_use]
    pub fn event_type(&self) -> &str {
        self.event_type.as_str()
    }

    /// Returns the event content.
    #[must_use]
    pub fn content(&self) -> &Value {
        &self.content
    }

    /// Returns true for the success and failure markers.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self.event_type(), COMPLETED_EVENT | FAILED_EVENT)
    }
}
