//! Process-local task queue for inline mode.

use std::collections::VecDeque;

use async_trait::async_trait;
use flightline_application::{WorkDispatcher, WorkSource};
use flightline_core::AppResult;
use flightline_domain::TaskSubmission;
use tokio::sync::Mutex;

/// In-memory FIFO implementing both queue ports.
#[derive(Default)]
pub struct InMemoryWorkQueue {
    pending: Mutex<VecDeque<TaskSubmission>>,
}

impl InMemoryWorkQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of pending submissions.
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }
}

#[async_trait]
impl WorkDispatcher for InMemoryWorkQueue {
    async fn submit(&self, submission: TaskSubmission) -> AppResult<()> {
        self.pending.lock().await.push_back(submission);
        Ok(())
    }
}

#[async_trait]
impl WorkSource for InMemoryWorkQueue {
    async fn next_submission(&self) -> AppResult<Option<TaskSubmission>> {
        Ok(self.pending.lock().await.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use flightline_application::{WorkDispatcher, WorkSource};
    use flightline_domain::{GroupName, TaskSubmission};
    use serde_json::json;

    use super::InMemoryWorkQueue;

    fn submission(payload: &str) -> TaskSubmission {
        TaskSubmission::new(
            "relay_payload",
            GroupName::new("default_group").unwrap_or_else(|_| unreachable!()),
            None,
            json!(payload),
        )
        .unwrap_or_else(|_| unreachable!())
    }

    #[tokio::test]
    async fn submissions_leave_in_arrival_order() {
        let queue = InMemoryWorkQueue::new();
        assert!(queue.submit(submission("first")).await.is_ok());
        assert!(queue.submit(submission("second")).await.is_ok());
        assert_eq!(queue.pending_count().await, 2);

        let first = queue.next_submission().await.unwrap_or_else(|_| unreachable!());
        let second = queue.next_submission().await.unwrap_or_else(|_| unreachable!());
        let empty = queue.next_submission().await.unwrap_or_else(|_| unreachable!());

        assert_eq!(first.map(|item| item.payload), Some(json!("first")));
        assert_eq!(second.map(|item| item.payload), Some(json!("second")));
        assert!(empty.is_none());
    }
}
