use std::collections::HashMap;

use async_trait::async_trait;
use flightline_application::TaskStatusStore;
use flightline_core::AppResult;
use flightline_domain::TaskStatusRecord;
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-memory task status store keeping the latest record per task.
#[derive(Default)]
pub struct InMemoryTaskStatusStore {
    records: RwLock<HashMap<Uuid, TaskStatusRecord>>,
}

impl InMemoryTaskStatusStore {
    /// Creates an empty status store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStatusStore for InMemoryTaskStatusStore {
    async fn set_status(&self, record: TaskStatusRecord) -> AppResult<()> {
        self.records.write().await.insert(record.task_id, record);
        Ok(())
    }

    async fn find_status(&self, task_id: Uuid) -> AppResult<Option<TaskStatusRecord>> {
        Ok(self.records.read().await.get(&task_id).cloned())
    }
}
