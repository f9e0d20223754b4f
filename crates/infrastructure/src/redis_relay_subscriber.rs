//! Bridge from Redis relay channels into the local group registry.

use std::sync::Arc;
use std::time::Duration;

use flightline_application::ChannelGroupRegistry;
use flightline_core::{AppError, AppResult};
use flightline_domain::{GroupName, RelayEvent};
use futures::StreamExt;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::RedisKeyspace;
use crate::redis_connection::unavailable;

const INITIAL_RECONNECT_DELAY: Duration = Duration::from_millis(250);
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(10);

/// Pattern subscriber forwarding every relay channel to local sessions.
pub struct RedisRelaySubscriber {
    client: redis::Client,
    keyspace: RedisKeyspace,
    registry: Arc<ChannelGroupRegistry>,
}

impl RedisRelaySubscriber {
    /// Creates a subscriber feeding `registry`.
    #[must_use]
    pub fn new(
        client: redis::Client,
        keyspace: RedisKeyspace,
        registry: Arc<ChannelGroupRegistry>,
    ) -> Self {
        Self {
            client,
            keyspace,
            registry,
        }
    }

    /// Forwards relay events until shutdown, reconnecting with backoff.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut delay = INITIAL_RECONNECT_DELAY;
        loop {
            match self.forward_until_closed(&mut shutdown, &mut delay).await {
                Ok(()) => {
                    info!("relay subscriber stopped");
                    return;
                }
                Err(error) => {
                    warn!(
                        error = %error,
                        retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "relay subscription lost, reconnecting"
                    );
                }
            }

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("relay subscriber stopped");
                        return;
                    }
                }
            }
            delay = delay.saturating_mul(2).min(MAX_RECONNECT_DELAY);
        }
    }

    async fn forward_until_closed(
        &self,
        shutdown: &mut watch::Receiver<bool>,
        delay: &mut Duration,
    ) -> AppResult<()> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|error| unavailable("failed to open relay subscription", error))?;
        let pattern = self.keyspace.relay_pattern();
        pubsub
            .psubscribe(pattern.as_str())
            .await
            .map_err(|error| unavailable("failed to subscribe to relay channels", error))?;

        *delay = INITIAL_RECONNECT_DELAY;
        info!(pattern = %pattern, "relay subscriber connected");

        let mut messages = pubsub.on_message();
        loop {
            tokio::select! {
                message = messages.next() => {
                    let Some(message) = message else {
                        return Err(AppError::StoreUnavailable(
                            "relay subscription stream closed".to_owned(),
                        ));
                    };
                    self.forward(&message);
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return Ok(());
                    }
                }
            }
        }
    }

    fn forward(&self, message: &redis::Msg) {
        let payload: String = match message.get_payload() {
            Ok(payload) => payload,
            Err(error) => {
                warn!(error = %error, "relay message payload is not text");
                return;
            }
        };

        match decode_relay_message(&self.keyspace, message.get_channel_name(), payload.as_str()) {
            Ok((group, event)) => {
                let report = self.registry.send(&group, &event);
                debug!(
                    group = %group,
                    event_type = event.event_type(),
                    delivered = report.delivered,
                    failed = report.failed,
                    "relay event forwarded"
                );
            }
            Err(error) => warn!(error = %error, "dropping malformed relay message"),
        }
    }
}

/// Decodes one relay channel message into its group and event.
pub fn decode_relay_message(
    keyspace: &RedisKeyspace,
    channel: &str,
    payload: &str,
) -> AppResult<(GroupName, RelayEvent)> {
    let group = keyspace.group_from_relay_channel(channel).ok_or_else(|| {
        AppError::Validation(format!("'{channel}' is not a relay channel"))
    })?;
    let event = serde_json::from_str(payload)
        .map_err(|error| AppError::Validation(format!("invalid relay event: {error}")))?;

    Ok((group, event))
}
