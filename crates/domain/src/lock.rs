use std::fmt::{Display, Formatter};
use std::time::Duration;

use flightline_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Mutual-exclusion key derived from a task name and an optional work item.
///
/// Without an item key the lock covers every caller of the task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LockKey {
    value: String,
    task_wide: bool,
}

impl LockKey {
    /// Derives the lock key as `"{task_name}_{item_key}"`, or `task_name` alone
    /// when the item key is absent or blank.
    pub fn derive(task_name: &str, item_key: Option<&str>) -> AppResult<Self> {
        let task_name = task_name.trim();
        if task_name.is_empty() {
            return Err(AppError::Validation(
                "lock task_name must not be empty".to_owned(),
            ));
        }

        match item_key.map(str::trim).filter(|value| !value.is_empty()) {
            Some(item_key) => Ok(Self {
                value: format!("{task_name}_{item_key}"),
                task_wide: false,
            }),
            None => Ok(Self {
                value: task_name.to_owned(),
                task_wide: true,
            }),
        }
    }

    /// Returns the storage key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.value.as_str()
    }

    /// Returns true when the key serializes all callers of the task.
    #[must_use]
    pub fn is_task_wide(&self) -> bool {
        self.task_wide
    }
}

impl Display for LockKey {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.value.as_str())
    }
}

/// One granted lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockLease {
    /// Key this lease holds.
    pub key: LockKey,
    /// Unique holder token used for compare-and-delete release.
    pub token: String,
    /// Holder that acquired the lease.
    pub holder_id: String,
    /// Expiry granted at acquire time.
    pub timeout: Duration,
}
