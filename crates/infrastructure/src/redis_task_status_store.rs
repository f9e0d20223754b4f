//! Redis-backed task execution status.

use async_trait::async_trait;
use flightline_application::TaskStatusStore;
use flightline_core::{AppError, AppResult};
use flightline_domain::TaskStatusRecord;
use redis::aio::ConnectionManager;
use uuid::Uuid;

use crate::RedisKeyspace;
use crate::redis_connection::unavailable;

const STATUS_TTL_SECONDS: u64 = 86_400;

/// Redis implementation of the task status store port.
#[derive(Clone)]
pub struct RedisTaskStatusStore {
    connection: ConnectionManager,
    keyspace: RedisKeyspace,
}

impl RedisTaskStatusStore {
    /// Creates one status store adapter.
    #[must_use]
    pub fn new(connection: ConnectionManager, keyspace: RedisKeyspace) -> Self {
        Self {
            connection,
            keyspace,
        }
    }
}

#[async_trait]
impl TaskStatusStore for RedisTaskStatusStore {
    async fn set_status(&self, record: TaskStatusRecord) -> AppResult<()> {
        let encoded = serde_json::to_string(&record).map_err(|error| {
            AppError::Internal(format!("failed to encode task status: {error}"))
        })?;

        let mut connection = self.connection.clone();
        redis::cmd("SET")
            .arg(self.keyspace.status(record.task_id))
            .arg(encoded)
            .arg("EX")
            .arg(STATUS_TTL_SECONDS)
            .query_async::<()>(&mut connection)
            .await
            .map_err(|error| unavailable("failed to write task status", error))
    }

    async fn find_status(&self, task_id: Uuid) -> AppResult<Option<TaskStatusRecord>> {
        let mut connection = self.connection.clone();
        let encoded: Option<String> = redis::cmd("GET")
            .arg(self.keyspace.status(task_id))
            .query_async(&mut connection)
            .await
            .map_err(|error| unavailable("failed to read task status", error))?;

        encoded
            .map(|value| {
                serde_json::from_str(value.as_str()).map_err(|error| {
                    AppError::Internal(format!("invalid task status for '{task_id}': {error}"))
                })
            })
            .transpose()
    }
}
