//! Redis-backed single-flight lock store.

use std::time::Duration;

use async_trait::async_trait;
use flightline_application::LockStore;
use flightline_core::AppResult;
use flightline_domain::{LockKey, LockLease};
use redis::Script;
use redis::aio::ConnectionManager;

use crate::RedisKeyspace;
use crate::redis_connection::unavailable;

const RELEASE_LOCK_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('DEL', KEYS[1])
else
  return 0
end
"#;

/// Redis implementation of the lock store port.
///
/// Acquire is one `SET NX PX`; release deletes the key only while it still
/// holds the caller's token.
#[derive(Clone)]
pub struct RedisLockStore {
    connection: ConnectionManager,
    keyspace: RedisKeyspace,
}

impl RedisLockStore {
    /// Creates one lock store adapter.
    #[must_use]
    pub fn new(connection: ConnectionManager, keyspace: RedisKeyspace) -> Self {
        Self {
            connection,
            keyspace,
        }
    }
}

#[async_trait]
impl LockStore for RedisLockStore {
    async fn try_acquire(
        &self,
        key: &LockKey,
        holder_id: &str,
        timeout: Duration,
    ) -> AppResult<Option<LockLease>> {
        let expiry_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX).max(1);
        let token = format!("{holder_id}:{}", uuid::Uuid::new_v4());
        let mut connection = self.connection.clone();

        let reply: Option<String> = redis::cmd("SET")
            .arg(self.keyspace.lock(key))
            .arg(token.as_str())
            .arg("NX")
            .arg("PX")
            .arg(expiry_ms)
            .query_async(&mut connection)
            .await
            .map_err(|error| unavailable("failed to acquire single-flight lock", error))?;

        Ok(reply.map(|_| LockLease {
            key: key.clone(),
            token,
            holder_id: holder_id.to_owned(),
            timeout,
        }))
    }

    async fn release(&self, lease: &LockLease) -> AppResult<()> {
        let mut connection = self.connection.clone();
        Script::new(RELEASE_LOCK_SCRIPT)
            .key(self.keyspace.lock(&lease.key))
            .arg(lease.token.as_str())
            .invoke_async::<i32>(&mut connection)
            .await
            .map_err(|error| unavailable("failed to release single-flight lock", error))?;

        Ok(())
    }
}
