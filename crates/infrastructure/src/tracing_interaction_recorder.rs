use async_trait::async_trait;
use flightline_application::InteractionRecorder;
use flightline_core::AppResult;
use flightline_domain::WorkResult;
use tracing::info;

/// Interaction recorder writing one structured log line per outcome.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingInteractionRecorder;

#[async_trait]
impl InteractionRecorder for TracingInteractionRecorder {
    async fn record(&self, result: &WorkResult) -> AppResult<()> {
        let error_kind = match result {
            WorkResult::Succeeded { .. } => None,
            WorkResult::Failed { kind, .. } => Some(kind.as_str()),
        };

        info!(
            hash_key = result.hash_key().unwrap_or_default(),
            outcome = result.state().as_str(),
            error_kind,
            timestamp = %result.timestamp(),
            "work item receipt"
        );
        Ok(())
    }
}
