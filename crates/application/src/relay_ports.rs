use async_trait::async_trait;
use flightline_core::AppResult;
use flightline_domain::{GroupName, RelayEvent};

/// Publishes relay events toward every session of a group.
#[async_trait]
pub trait RelayPublisher: Send + Sync {
    /// Publishes one event. Delivery to individual sessions is best effort.
    async fn publish(&self, group: &GroupName, event: &RelayEvent) -> AppResult<()>;
}
