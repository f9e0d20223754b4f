//! Named broadcast groups of live client sessions.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use flightline_core::AppResult;
use flightline_domain::{GroupName, RelayEvent, ServerMessage, SessionId};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::RelayPublisher;

/// Outbound half of one session's message channel.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    outbox: mpsc::Sender<ServerMessage>,
}

impl SessionHandle {
    /// Creates a session with a bounded outbox and returns its receiver.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ServerMessage>) {
        let (outbox, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                id: SessionId::new(),
                outbox,
            },
            receiver,
        )
    }

    /// Returns the session identifier.
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Queues one message without waiting.
    pub fn deliver(&self, message: ServerMessage) -> Result<(), DeliveryFailure> {
        self.outbox.try_send(message).map_err(|error| match error {
            TrySendError::Full(_) => DeliveryFailure::OutboxFull,
            TrySendError::Closed(_) => DeliveryFailure::Disconnected,
        })
    }
}

/// Reason a message could not be handed to one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryFailure {
    /// The session's connection is gone.
    Disconnected,
    /// The session is not draining its outbox fast enough.
    OutboxFull,
}

impl Display for DeliveryFailure {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => formatter.write_str("session disconnected"),
            Self::OutboxFull => formatter.write_str("session outbox full"),
        }
    }
}

/// Per-send delivery counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Sessions the message was queued for.
    pub delivered: usize,
    /// Sessions that could not take the message.
    pub failed: usize,
}

/// Registry of group memberships.
///
/// Membership changes only through `join` and `leave`; a send goes to the
/// snapshot of members taken when the send starts.
#[derive(Default)]
pub struct ChannelGroupRegistry {
    groups: RwLock<HashMap<GroupName, HashMap<SessionId, SessionHandle>>>,
}

impl ChannelGroupRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a session to a group. Returns false when it was already a member.
    pub fn join(&self, group: &GroupName, session: &SessionHandle) -> bool {
        let mut groups = self.groups.write().unwrap_or_else(PoisonError::into_inner);
        let members = groups.entry(group.clone()).or_default();
        if members.contains_key(&session.id()) {
            return false;
        }

        members.insert(session.id(), session.clone());
        true
    }

    /// Removes a session from a group. Returns false when it was not a member.
    pub fn leave(&self, group: &GroupName, session_id: SessionId) -> bool {
        let mut groups = self.groups.write().unwrap_or_else(PoisonError::into_inner);
        let Some(members) = groups.get_mut(group) else {
            return false;
        };

        let removed = members.remove(&session_id).is_some();
        if members.is_empty() {
            groups.remove(group);
        }
        removed
    }

    /// Removes a session from every group and returns how many it left.
    pub fn leave_all(&self, session_id: SessionId) -> usize {
        let mut groups = self.groups.write().unwrap_or_else(PoisonError::into_inner);
        let mut left = 0;
        groups.retain(|_, members| {
            if members.remove(&session_id).is_some() {
                left += 1;
            }
            !members.is_empty()
        });
        left
    }

    /// Fans one event out to the current members of a group.
    pub fn send(&self, group: &GroupName, event: &RelayEvent) -> DeliveryReport {
        let members: Vec<SessionHandle> = {
            let groups = self.groups.read().unwrap_or_else(PoisonError::into_inner);
            match groups.get(group) {
                Some(members) => members.values().cloned().collect(),
                None => return DeliveryReport::default(),
            }
        };

        let message = ServerMessage::from(event);
        let mut report = DeliveryReport::default();
        for member in members {
            match member.deliver(message.clone()) {
                Ok(()) => report.delivered += 1,
                Err(failure) => {
                    report.failed += 1;
                    log_delivery_failure(group, member.id(), event.event_type(), failure);
                }
            }
        }

        report
    }

    /// Returns the identifiers currently in a group.
    #[must_use]
    pub fn members(&self, group: &GroupName) -> Vec<SessionId> {
        let groups = self.groups.read().unwrap_or_else(PoisonError::into_inner);
        let mut members: Vec<SessionId> = groups
            .get(group)
            .map(|members| members.keys().copied().collect())
            .unwrap_or_default();
        members.sort();
        members
    }

    /// Returns the number of non-empty groups.
    #[must_use]
    pub fn group_count(&self) -> usize {
        self.groups
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns the number of distinct sessions across all groups.
    #[must_use]
    pub fn session_count(&self) -> usize {
        let groups = self.groups.read().unwrap_or_else(PoisonError::into_inner);
        let mut sessions: Vec<SessionId> = groups
            .values()
            .flat_map(|members| members.keys().copied())
            .collect();
        sessions.sort();
        sessions.dedup();
        sessions.len()
    }
}

fn log_delivery_failure(
    group: &GroupName,
    session_id: SessionId,
    event_type: &str,
    failure: DeliveryFailure,
) {
    match failure {
        DeliveryFailure::Disconnected => debug!(
            group = %group,
            session_id = %session_id,
            event_type,
            "skipping relay delivery to disconnected session"
        ),
        DeliveryFailure::OutboxFull => warn!(
            group = %group,
            session_id = %session_id,
            event_type,
            "dropping relay event for slow session"
        ),
    }
}

#[async_trait]
impl RelayPublisher for ChannelGroupRegistry {
    async fn publish(&self, group: &GroupName, event: &RelayEvent) -> AppResult<()> {
        self.send(group, event);
        Ok(())
    }
}
