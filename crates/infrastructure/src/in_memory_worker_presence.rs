//! Process-local worker presence for inline mode.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use flightline_application::WorkerPresence;
use flightline_core::AppResult;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// In-memory worker presence with an active heartbeat window.
pub struct InMemoryWorkerPresence {
    heartbeats: RwLock<HashMap<String, Instant>>,
    active_window: Duration,
}

impl InMemoryWorkerPresence {
    /// Creates presence tracking that forgets workers silent for `active_window`.
    #[must_use]
    pub fn new(active_window: Duration) -> Self {
        Self {
            heartbeats: RwLock::new(HashMap::new()),
            active_window,
        }
    }
}

#[async_trait]
impl WorkerPresence for InMemoryWorkerPresence {
    async fn record_heartbeat(&self, worker_id: &str) -> AppResult<()> {
        let now = Instant::now();
        let mut heartbeats = self.heartbeats.write().await;
        heartbeats.insert(worker_id.to_owned(), now);
        heartbeats.retain(|_, seen_at| now.duration_since(*seen_at) <= self.active_window);
        Ok(())
    }

    async fn is_reachable(&self) -> AppResult<bool> {
        let now = Instant::now();
        Ok(self
            .heartbeats
            .read()
            .await
            .values()
            .any(|seen_at| now.duration_since(*seen_at) <= self.active_window))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use flightline_application::WorkerPresence;

    use super::InMemoryWorkerPresence;

    #[tokio::test(start_paused = true)]
    async fn worker_is_reachable_only_inside_the_active_window() {
        let presence = InMemoryWorkerPresence::new(Duration::from_secs(30));
        assert!(matches!(presence.is_reachable().await, Ok(false)));

        assert!(presence.record_heartbeat("worker-1").await.is_ok());
        assert!(matches!(presence.is_reachable().await, Ok(true)));

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(matches!(presence.is_reachable().await, Ok(false)));
    }
}
