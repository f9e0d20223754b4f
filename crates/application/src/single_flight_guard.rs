//! Single-flight execution guard.
//!
//! For one `LockKey` at most one guarded call runs at a time across every
//! process sharing the lock store. Concurrent callers with the same key are
//! dropped, not queued.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use flightline_core::AppResult;
use flightline_domain::{LockKey, LockLease};
use futures::FutureExt;
use tracing::{debug, warn};

use crate::LockStore;

/// Result of one guarded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SingleFlightOutcome<T> {
    /// The lock was granted and the call ran to completion.
    Executed(T),
    /// Another holder owns the key; the call was not invoked.
    Skipped,
}

impl<T> SingleFlightOutcome<T> {
    /// Returns the call output when it ran.
    pub fn into_executed(self) -> Option<T> {
        match self {
            Self::Executed(value) => Some(value),
            Self::Skipped => None,
        }
    }

    /// Returns true when the call was dropped as a duplicate.
    #[must_use]
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped)
    }
}

/// Wraps units of work in a per-key distributed lock.
#[derive(Clone)]
pub struct SingleFlightGuard {
    lock_store: Arc<dyn LockStore>,
    holder_id: String,
    timeout: Duration,
}

impl SingleFlightGuard {
    /// Creates a guard acquiring locks as `holder_id` with the given expiry.
    #[must_use]
    pub fn new(
        lock_store: Arc<dyn LockStore>,
        holder_id: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            lock_store,
            holder_id: holder_id.into(),
            timeout,
        }
    }

    /// Runs `run` when the key is free and releases the key on every exit path.
    ///
    /// A panic inside `run` releases the lock before it resumes unwinding. If
    /// the returned future is dropped mid-flight the lock is left to expire.
    pub async fn run<F, Fut, T>(&self, key: &LockKey, run: F) -> AppResult<SingleFlightOutcome<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if key.is_task_wide() {
            warn!(
                lock_key = %key,
                "single-flight key has no item identity, serializing every caller of the task"
            );
        }

        let Some(lease) = self
            .lock_store
            .try_acquire(key, self.holder_id.as_str(), self.timeout)
            .await?
        else {
            debug!(
                lock_key = %key,
                holder_id = %self.holder_id,
                "lock busy, dropping duplicate call"
            );
            return Ok(SingleFlightOutcome::Skipped);
        };

        debug!(lock_key = %key, holder_id = %self.holder_id, "lock acquired");
        let result = AssertUnwindSafe(async move { run().await })
            .catch_unwind()
            .await;
        self.release(&lease).await;

        match result {
            Ok(value) => Ok(SingleFlightOutcome::Executed(value)),
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    async fn release(&self, lease: &LockLease) {
        if let Err(error) = self.lock_store.release(lease).await {
            warn!(
                lock_key = %lease.key,
                error = %error,
                "failed to release single-flight lock, it will expire on its own"
            );
        }
    }
}

#[cfg(test)]
mod tests;
