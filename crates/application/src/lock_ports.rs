use std::time::Duration;

use async_trait::async_trait;
use flightline_core::AppResult;
use flightline_domain::{LockKey, LockLease};

/// Shared store granting expiring mutual-exclusion locks.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Attempts to acquire the key without waiting.
    ///
    /// Returns `Ok(None)` when another holder owns a live lock. Fails with
    /// `AppError::StoreUnavailable` when the store cannot be reached; it never
    /// grants a lock it could not record.
    async fn try_acquire(
        &self,
        key: &LockKey,
        holder_id: &str,
        timeout: Duration,
    ) -> AppResult<Option<LockLease>>;

    /// Releases one lease using token compare-and-delete semantics.
    ///
    /// Releasing an expired, released, or re-acquired lock is a no-op.
    async fn release(&self, lease: &LockLease) -> AppResult<()>;
}
