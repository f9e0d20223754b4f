//! Worker heartbeats in a Redis sorted set.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use flightline_application::WorkerPresence;
use flightline_core::AppResult;
use redis::aio::ConnectionManager;

use crate::RedisKeyspace;
use crate::redis_connection::unavailable;

/// Redis implementation of the worker presence port.
///
/// Members are worker ids scored by their last heartbeat in epoch
/// milliseconds; heartbeats older than the active window are pruned.
#[derive(Clone)]
pub struct RedisWorkerPresence {
    connection: ConnectionManager,
    keyspace: RedisKeyspace,
    active_window: Duration,
}

impl RedisWorkerPresence {
    /// Creates one presence adapter.
    #[must_use]
    pub fn new(
        connection: ConnectionManager,
        keyspace: RedisKeyspace,
        active_window: Duration,
    ) -> Self {
        Self {
            connection,
            keyspace,
            active_window,
        }
    }

    fn window_start_ms(&self) -> i64 {
        let window_ms = i64::try_from(self.active_window.as_millis()).unwrap_or(i64::MAX);
        Utc::now().timestamp_millis().saturating_sub(window_ms)
    }
}

#[async_trait]
impl WorkerPresence for RedisWorkerPresence {
    async fn record_heartbeat(&self, worker_id: &str) -> AppResult<()> {
        let mut connection = self.connection.clone();
        redis::pipe()
            .cmd("ZADD")
            .arg(self.keyspace.workers())
            .arg(Utc::now().timestamp_millis())
            .arg(worker_id)
            .ignore()
            .cmd("ZREMRANGEBYSCORE")
            .arg(self.keyspace.workers())
            .arg("-inf")
            .arg(format!("({}", self.window_start_ms()))
            .ignore()
            .query_async::<()>(&mut connection)
            .await
            .map_err(|error| unavailable("failed to record worker heartbeat", error))
    }

    async fn is_reachable(&self) -> AppResult<bool> {
        let mut connection = self.connection.clone();
        let active: u64 = redis::cmd("ZCOUNT")
            .arg(self.keyspace.workers())
            .arg(self.window_start_ms())
            .arg("+inf")
            .query_async(&mut connection)
            .await
            .map_err(|error| unavailable("failed to count active workers", error))?;

        Ok(active > 0)
    }
}
