use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use flightline_infrastructure::ping_redis;
use redis::aio::ConnectionManager;
use tracing::debug;

use crate::api_config::TaskExecutionMode;
use crate::dto::{HealthDependencyStatus, HealthResponse};
use crate::state::AppState;

pub async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let redis_required = state.execution_mode == TaskExecutionMode::Queued;
    let redis = check_redis(state.redis_connection.as_ref(), redis_required).await;
    let queue_depth = match state.task_queue.pending_count().await {
        Ok(depth) => Some(depth),
        Err(error) => {
            debug!(error = %error, "failed to read task queue depth");
            None
        }
    };

    let ready = redis.status != "error";
    let status = if ready { "ok" } else { "degraded" };
    let http_status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let registry = state.session_service.registry();

    (
        http_status,
        Json(HealthResponse {
            status,
            ready,
            execution_mode: state.execution_mode.as_str(),
            redis,
            queue_depth,
            sessions: registry.session_count(),
            groups: registry.group_count(),
        }),
    )
}

async fn check_redis(
    connection: Option<&ConnectionManager>,
    redis_required: bool,
) -> HealthDependencyStatus {
    let Some(connection) = connection else {
        return if redis_required {
            HealthDependencyStatus {
                status: "error",
                detail: Some("redis connection is not configured".to_owned()),
            }
        } else {
            HealthDependencyStatus {
                status: "disabled",
                detail: None,
            }
        };
    };

    match ping_redis(connection).await {
        Ok(()) => HealthDependencyStatus {
            status: "ok",
            detail: None,
        },
        Err(error) if redis_required => HealthDependencyStatus {
            status: "error",
            detail: Some(error.to_string()),
        },
        Err(error) => HealthDependencyStatus {
            status: "degraded",
            detail: Some(error.to_string()),
        },
    }
}
