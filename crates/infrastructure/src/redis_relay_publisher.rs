//! Relay events over Redis pub/sub.

use async_trait::async_trait;
use flightline_application::RelayPublisher;
use flightline_core::{AppError, AppResult};
use flightline_domain::{GroupName, RelayEvent};
use redis::aio::ConnectionManager;
use tracing::debug;

use crate::RedisKeyspace;
use crate::redis_connection::unavailable;

/// Publishes relay events on the group's Redis channel.
#[derive(Clone)]
pub struct RedisRelayPublisher {
    connection: ConnectionManager,
    keyspace: RedisKeyspace,
}

impl RedisRelayPublisher {
    /// Creates one publisher adapter.
    #[must_use]
    pub fn new(connection: ConnectionManager, keyspace: RedisKeyspace) -> Self {
        Self {
            connection,
            keyspace,
        }
    }
}

#[async_trait]
impl RelayPublisher for RedisRelayPublisher {
    async fn publish(&self, group: &GroupName, event: &RelayEvent) -> AppResult<()> {
        let encoded = serde_json::to_string(event)
            .map_err(|error| AppError::Internal(format!("failed to encode relay event: {error}")))?;

        let mut connection = self.connection.clone();
        let receivers: i64 = redis::cmd("PUBLISH")
            .arg(self.keyspace.relay(group))
            .arg(encoded)
            .query_async(&mut connection)
            .await
            .map_err(|error| unavailable("failed to publish relay event", error))?;

        debug!(
            group = %group,
            event_type = event.event_type(),
            receivers,
            "relay event published"
        );
        Ok(())
    }
}
