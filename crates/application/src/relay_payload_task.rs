use std::time::Duration;

use async_trait::async_trait;
use flightline_domain::TaskFailure;
use serde_json::json;

use crate::{TaskContext, TaskHandler};

/// Task name of [`RelayPayloadTask`].
pub const RELAY_PAYLOAD_TASK: &str = "relay_payload";

/// Relays each word of a text payload as one progress step.
pub struct RelayPayloadTask {
    step_delay: Duration,
}

impl RelayPayloadTask {
    /// Creates the task with a pause between steps.
    #[must_use]
    pub fn new(step_delay: Duration) -> Self {
        Self { step_delay }
    }
}

#[async_trait]
impl TaskHandler for RelayPayloadTask {
    fn name(&self) -> &str {
        RELAY_PAYLOAD_TASK
    }

    async fn run(&self, context: &TaskContext) -> Result<(), TaskFailure> {
        let text = context.payload().as_str().ok_or_else(|| {
            TaskFailure::new("InvalidPayload", "relay_payload expects a string payload")
        })?;
        let words: Vec<&str> = text.split_whitespace().collect();
        if words.is_empty() {
            return Err(TaskFailure::new(
                "EmptyPayload",
                "payload contains no words to relay",
            ));
        }

        let total = words.len();
        for (index, word) in words.into_iter().enumerate() {
            context
                .emit_progress(json!({
                    "step": index + 1,
                    "total": total,
                    "content": word,
                }))
                .await;

            if !self.step_delay.is_zero() && index + 1 < total {
                tokio::time::sleep(self.step_delay).await;
            }
        }

        Ok(())
    }
}
