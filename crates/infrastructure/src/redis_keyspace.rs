//! Key and channel names shared by every Redis adapter.

use flightline_domain::{GroupName, LockKey};
use uuid::Uuid;

/// Names every Redis key below one configurable prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisKeyspace {
    prefix: String,
}

impl RedisKeyspace {
    /// Creates a keyspace rooted at `prefix`.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let prefix = prefix.trim().trim_end_matches(':').to_owned();
        Self { prefix }
    }

    /// Single-flight lock key.
    #[must_use]
    pub fn lock(&self, key: &LockKey) -> String {
        format!("{}:lock:{key}", self.prefix)
    }

    /// List holding pending task submissions.
    #[must_use]
    pub fn queue(&self) -> String {
        format!("{}:queue:tasks", self.prefix)
    }

    /// Pub/sub channel carrying relay events of one group.
    #[must_use]
    pub fn relay(&self, group: &GroupName) -> String {
        format!("{}:relay:{group}", self.prefix)
    }

    /// Pattern matching every relay channel.
    #[must_use]
    pub fn relay_pattern(&self) -> String {
        format!("{}:relay:*", self.prefix)
    }

    /// Recovers the group name from a relay channel.
    #[must_use]
    pub fn group_from_relay_channel(&self, channel: &str) -> Option<GroupName> {
        let group = channel.strip_prefix(self.prefix.as_str())?.strip_prefix(":relay:")?;
        GroupName::new(group).ok()
    }

    /// Execution status of one task.
    #[must_use]
    pub fn status(&self, task_id: Uuid) -> String {
        format!("{}:task:{task_id}:status", self.prefix)
    }

    /// Sorted set of worker heartbeats scored by epoch milliseconds.
    #[must_use]
    pub fn workers(&self) -> String {
        format!("{}:workers", self.prefix)
    }
}
