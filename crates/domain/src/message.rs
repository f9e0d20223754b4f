use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::RelayEvent;

/// Inbound client frame.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientMessage {
    /// Opaque request payload.
    pub payload: String,
}

/// Worker pool reachability reported to newly connected clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PoolStatus {
    /// At least one worker is reachable.
    Green,
    /// No worker heartbeat was observed.
    Red,
}

impl PoolStatus {
    /// Maps a reachability probe result to a status.
    #[must_use]
    pub fn from_reachable(reachable: bool) -> Self {
        if reachable { Self::Green } else { Self::Red }
    }
}

/// Outbound frame delivered to one client connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Receipt acknowledgment.
    Ack,
    /// Worker pool reachability.
    Status {
        /// Current status.
        content: PoolStatus,
    },
    /// Relay event forwarded from a group send.
    Relay {
        /// Relay event type.
        event_type: String,
        /// Relay event content.
        content: Value,
    },
}

impl From<&RelayEvent> for ServerMessage {
    fn from(event: &RelayEvent) -> Self {
        Self::Relay {
            event_type: event.event_type().to_owned(),
            content: event.content().clone(),
        }
    }
}
