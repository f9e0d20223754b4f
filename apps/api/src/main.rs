//! Flightline API composition root.

#![forbid(unsafe_code)]

mod api_config;
mod api_router;
mod api_services;
mod dto;
mod error;
mod handlers;
mod middleware;
mod state;

use flightline_core::AppError;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::api_config::{ApiConfig, init_tracing};
use crate::api_router::build_router;
use crate::api_services::build_app_state;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = ApiConfig::load()?;
    let (shutdown_sender, shutdown_receiver) = watch::channel(false);
    let runtime = build_app_state(&config, shutdown_receiver).await?;
    let app = build_router(runtime.state);

    let address = config.socket_address()?;
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .map_err(|error| AppError::Internal(format!("failed to bind listener: {error}")))?;

    info!(
        %address,
        execution_mode = config.execution_mode.as_str(),
        "flightline-api listening"
    );

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|error| AppError::Internal(format!("api server error: {error}")));

    shutdown_sender.send_replace(true);
    for task in runtime.background_tasks {
        if let Err(error) = task.await {
            warn!(error = %error, "background task ended abnormally");
        }
    }

    info!("flightline-api stopped");
    served
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(error = %error, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }

    info!("shutdown signal received");
}
