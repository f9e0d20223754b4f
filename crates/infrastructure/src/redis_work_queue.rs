//! Redis list used as the shared task queue.

use async_trait::async_trait;
use flightline_application::{WorkDispatcher, WorkSource};
use flightline_core::{AppError, AppResult};
use flightline_domain::TaskSubmission;
use redis::aio::ConnectionManager;

use crate::RedisKeyspace;
use crate::redis_connection::unavailable;

/// Redis implementation of both queue ports.
///
/// Producers `LPUSH`, consumers `RPOP`, so submissions leave in arrival order.
#[derive(Clone)]
pub struct RedisWorkQueue {
    connection: ConnectionManager,
    keyspace: RedisKeyspace,
}

impl RedisWorkQueue {
    /// Creates one queue adapter.
    #[must_use]
    pub fn new(connection: ConnectionManager, keyspace: RedisKeyspace) -> Self {
        Self {
            connection,
            keyspace,
        }
    }

    /// Returns the number of pending submissions.
    pub async fn pending_count(&self) -> AppResult<u64> {
        let mut connection = self.connection.clone();
        redis::cmd("LLEN")
            .arg(self.keyspace.queue())
            .query_async(&mut connection)
            .await
            .map_err(|error| unavailable("failed to read task queue length", error))
    }
}

#[async_trait]
impl WorkDispatcher for RedisWorkQueue {
    async fn submit(&self, submission: TaskSubmission) -> AppResult<()> {
        let encoded = serde_json::to_string(&submission).map_err(|error| {
            AppError::Internal(format!("failed to encode task submission: {error}"))
        })?;

        let mut connection = self.connection.clone();
        redis::cmd("LPUSH")
            .arg(self.keyspace.queue())
            .arg(encoded)
            .query_async::<i64>(&mut connection)
            .await
            .map_err(|error| unavailable("failed to enqueue task submission", error))?;

        Ok(())
    }
}

#[async_trait]
impl WorkSource for RedisWorkQueue {
    async fn next_submission(&self) -> AppResult<Option<TaskSubmission>> {
        let mut connection = self.connection.clone();
        let encoded: Option<String> = redis::cmd("RPOP")
            .arg(self.keyspace.queue())
            .query_async(&mut connection)
            .await
            .map_err(|error| unavailable("failed to claim task submission", error))?;

        encoded
            .map(|value| {
                serde_json::from_str(value.as_str()).map_err(|error| {
                    AppError::Internal(format!("invalid task submission in queue: {error}"))
                })
            })
            .transpose()
    }
}
