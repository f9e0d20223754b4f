//! Lifecycle of one client connection: connect, receive, disconnect.

use std::sync::Arc;

use flightline_core::{AppResult, ClientIdentity};
use flightline_domain::{
    GroupName, PoolStatus, RelayEvent, ServerMessage, SessionId, TaskSubmission,
};
use serde_json::Value;
use sha1::{Digest, Sha1};
use tracing::{debug, info, warn};

use crate::{ChannelGroupRegistry, SessionHandle, WorkDispatcher, WorkerPresence};

/// Derives the work item identity of a payload as its hex SHA-1 digest.
#[must_use]
pub fn derive_item_key(payload: &str) -> String {
    hex::encode(Sha1::digest(payload.as_bytes()))
}

/// Application service driving client sessions.
#[derive(Clone)]
pub struct SessionService {
    registry: Arc<ChannelGroupRegistry>,
    dispatcher: Arc<dyn WorkDispatcher>,
    presence: Arc<dyn WorkerPresence>,
    default_group: GroupName,
    task_name: String,
}

impl SessionService {
    /// Creates a session service submitting `task_name` for every request.
    #[must_use]
    pub fn new(
        registry: Arc<ChannelGroupRegistry>,
        dispatcher: Arc<dyn WorkDispatcher>,
        presence: Arc<dyn WorkerPresence>,
        default_group: GroupName,
        task_name: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            dispatcher,
            presence,
            default_group,
            task_name: task_name.into(),
        }
    }

    /// Returns the shared group registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ChannelGroupRegistry> {
        &self.registry
    }

    /// Returns the group every session joins on connect.
    #[must_use]
    pub fn default_group(&self) -> &GroupName {
        &self.default_group
    }

    /// Joins the default group and greets the new session.
    ///
    /// The acknowledgment and the worker pool status go to this session only.
    pub async fn connect(&self, identity: &ClientIdentity, session: &SessionHandle) -> PoolStatus {
        self.registry.join(&self.default_group, session);

        let status = match self.presence.is_reachable().await {
            Ok(reachable) => PoolStatus::from_reachable(reachable),
            Err(error) => {
                warn!(error = %error, "worker pool probe failed, reporting pool as unreachable");
                PoolStatus::Red
            }
        };

        deliver_direct(session, ServerMessage::Ack);
        deliver_direct(session, ServerMessage::Status { content: status });

        info!(
            session_id = %session.id(),
            subject = identity.subject(),
            group = %self.default_group,
            pool_status = ?status,
            "client session connected"
        );
        status
    }

    /// Acknowledges one inbound payload and submits a task keyed by its digest.
    ///
    /// The group hears `accepted_task` only once the submission is queued. When
    /// queueing fails the caller alone receives `rejected_task` and the error is
    /// returned. Results arrive later as relay events.
    pub async fn receive(
        &self,
        session: &SessionHandle,
        payload: &str,
    ) -> AppResult<TaskSubmission> {
        let hash_key = derive_item_key(payload);
        deliver_direct(session, ServerMessage::Ack);

        let submission = TaskSubmission::new(
            self.task_name.as_str(),
            self.default_group.clone(),
            Some(hash_key.clone()),
            Value::String(payload.to_owned()),
        )?;
        if let Err(error) = self.dispatcher.submit(submission.clone()).await {
            warn!(
                session_id = %session.id(),
                hash_key = %hash_key,
                error = %error,
                "task submission rejected"
            );
            let reason = if error.is_store_unavailable() {
                "task queue unavailable"
            } else {
                "task submission failed"
            };
            deliver_direct(
                session,
                ServerMessage::from(&RelayEvent::rejected(hash_key.as_str(), reason)),
            );
            return Err(error);
        }

        let report = self
            .registry
            .send(&self.default_group, &RelayEvent::accepted(payload, hash_key.as_str()));

        info!(
            session_id = %session.id(),
            task_id = %submission.task_id,
            task_name = %submission.task_name,
            hash_key = %hash_key,
            notified_sessions = report.delivered,
            "task submitted"
        );
        Ok(submission)
    }

    /// Removes the session from every group it joined.
    pub fn disconnect(&self, session_id: SessionId) -> usize {
        let left = self.registry.leave_all(session_id);
        info!(session_id = %session_id, groups_left = left, "client session disconnected");
        left
    }
}

fn deliver_direct(session: &SessionHandle, message: ServerMessage) {
    if let Err(failure) = session.deliver(message) {
        debug!(session_id = %session.id(), failure = %failure, "direct session message dropped");
    }
}

#[cfg(test)]
mod tests;
