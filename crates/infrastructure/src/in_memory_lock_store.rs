//! Process-local lock store for inline mode and tests.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use flightline_application::LockStore;
use flightline_core::AppResult;
use flightline_domain::{LockKey, LockLease};
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct HeldLock {
    token: String,
    expires_at: Instant,
}

/// In-memory lock store with the same expiry semantics as the Redis adapter.
///
/// Uses the tokio clock, so paused-time tests can step through expiry.
#[derive(Default)]
pub struct InMemoryLockStore {
    held: Mutex<HashMap<String, HeldLock>>,
}

impl InMemoryLockStore {
    /// Creates an empty lock store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true while an unexpired lock exists for `key`.
    pub async fn is_held(&self, key: &LockKey) -> bool {
        let now = Instant::now();
        self.held
            .lock()
            .await
            .get(key.as_str())
            .is_some_and(|lock| lock.expires_at >= now)
    }
}

#[async_trait]
impl LockStore for InMemoryLockStore {
    async fn try_acquire(
        &self,
        key: &LockKey,
        holder_id: &str,
        timeout: Duration,
    ) -> AppResult<Option<LockLease>> {
        let now = Instant::now();
        let mut held = self.held.lock().await;
        held.retain(|_, lock| lock.expires_at >= now);
        if held.contains_key(key.as_str()) {
            return Ok(None);
        }

        let token = format!("{holder_id}:{}", uuid::Uuid::new_v4());
        let expires_at = now.checked_add(timeout).unwrap_or(now);
        held.insert(
            key.as_str().to_owned(),
            HeldLock {
                token: token.clone(),
                expires_at,
            },
        );

        Ok(Some(LockLease {
            key: key.clone(),
            token,
            holder_id: holder_id.to_owned(),
            timeout,
        }))
    }

    async fn release(&self, lease: &LockLease) -> AppResult<()> {
        let mut held = self.held.lock().await;
        if held
            .get(lease.key.as_str())
            .is_some_and(|lock| lock.token == lease.token)
        {
            held.remove(lease.key.as_str());
        }

        Ok(())
    }
}
