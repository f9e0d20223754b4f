use std::sync::Arc;

use flightline_application::SessionService;
use flightline_core::AppResult;
use flightline_infrastructure::{InMemoryWorkQueue, RedisWorkQueue};
use redis::aio::ConnectionManager;

use crate::api_config::TaskExecutionMode;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub session_service: SessionService,
    pub redis_connection: Option<ConnectionManager>,
    pub task_queue: TaskQueueHandle,
    pub execution_mode: TaskExecutionMode,
    pub socket_access_token: Option<String>,
    pub session_outbox_capacity: usize,
}

/// Read access to the task queue backing the current execution mode.
#[derive(Clone)]
pub enum TaskQueueHandle {
    Redis(RedisWorkQueue),
    InMemory(Arc<InMemoryWorkQueue>),
}

impl TaskQueueHandle {
    /// Returns how many submissions wait for a worker.
    pub async fn pending_count(&self) -> AppResult<u64> {
        match self {
            Self::Redis(queue) => queue.pending_count().await,
            Self::InMemory(queue) => {
                Ok(u64::try_from(queue.pending_count().await).unwrap_or(u64::MAX))
            }
        }
    }
}
