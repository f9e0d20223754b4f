//! Flightline task worker runtime.

#![forbid(unsafe_code)]

use std::env;
use std::sync::Arc;
use std::time::Duration;

use flightline_application::{
    RelayPayloadTask, SingleFlightGuard, TaskExecutor, TaskRegistry, WorkerPool, WorkerPoolConfig,
};
use flightline_core::{AppError, AppResult};
use flightline_infrastructure::{
    RedisKeyspace, RedisLockStore, RedisRelayPublisher, RedisTaskStatusStore, RedisWorkQueue,
    RedisWorkerPresence, TracingInteractionRecorder, connect_redis, open_redis_client,
};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
struct WorkerConfig {
    redis_url: String,
    key_prefix: String,
    worker_id: String,
    concurrency: usize,
    lock_timeout_seconds: u64,
    poll_timeout_seconds: u64,
    heartbeat_interval_seconds: u64,
    active_window_seconds: u64,
    max_redeliveries: u32,
    step_delay_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = WorkerConfig::load()?;
    let client = open_redis_client(config.redis_url.as_str())?;
    let connection = connect_redis(&client).await?;
    let keyspace = RedisKeyspace::new(config.key_prefix.as_str());
    let queue = Arc::new(RedisWorkQueue::new(connection.clone(), keyspace.clone()));

    let executor = TaskExecutor::new(
        SingleFlightGuard::new(
            Arc::new(RedisLockStore::new(connection.clone(), keyspace.clone())),
            config.worker_id.as_str(),
            Duration::from_secs(config.lock_timeout_seconds),
        ),
        TaskRegistry::new().with_handler(Arc::new(RelayPayloadTask::new(Duration::from_millis(
            config.step_delay_ms,
        )))),
        Arc::new(RedisRelayPublisher::new(connection.clone(), keyspace.clone())),
        Arc::new(RedisTaskStatusStore::new(connection.clone(), keyspace.clone())),
        Arc::new(TracingInteractionRecorder),
    );
    let pool = WorkerPool::new(
        WorkerPoolConfig {
            worker_id: config.worker_id.clone(),
            concurrency: config.concurrency,
            poll_interval: Duration::from_secs(config.poll_timeout_seconds),
            heartbeat_interval: Duration::from_secs(config.heartbeat_interval_seconds),
            max_redeliveries: config.max_redeliveries,
            redelivery_delay: Duration::from_secs(config.poll_timeout_seconds),
        },
        queue.clone(),
        queue,
        Arc::new(RedisWorkerPresence::new(
            connection,
            keyspace,
            Duration::from_secs(config.active_window_seconds),
        )),
        executor,
    );

    info!(
        worker_id = %config.worker_id,
        key_prefix = %config.key_prefix,
        concurrency = config.concurrency,
        lock_timeout_seconds = config.lock_timeout_seconds,
        poll_timeout_seconds = config.poll_timeout_seconds,
        "flightline-worker started"
    );

    let (shutdown_sender, shutdown_receiver) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(error = %error, "failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        info!("shutdown signal received, draining in-flight tasks");
        shutdown_sender.send_replace(true);
    });

    let stats = pool.run(shutdown_receiver).await;
    info!(
        worker_id = %config.worker_id,
        succeeded = stats.succeeded,
        failed = stats.failed,
        skipped = stats.skipped,
        "flightline-worker stopped"
    );
    Ok(())
}

impl WorkerConfig {
    fn load() -> AppResult<Self> {
        let redis_url = required_env("REDIS_URL")?;
        let key_prefix = env::var("FLIGHTLINE_KEY_PREFIX")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| "flightline".to_owned());
        let worker_id = env::var("WORKER_ID")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| format!("worker-{}", std::process::id()));
        let concurrency = parse_env_usize("WORKER_CONCURRENCY", 4)?;
        let lock_timeout_seconds = parse_env_u64("LOCK_TIMEOUT_SECONDS", 600)?;
        let poll_timeout_seconds = parse_env_u64("WORKER_POLL_TIMEOUT_SECONDS", 5)?;
        let heartbeat_interval_seconds = parse_env_u64("WORKER_HEARTBEAT_INTERVAL_SECONDS", 10)?;
        let active_window_seconds = parse_env_u64("WORKER_ACTIVE_WINDOW_SECONDS", 30)?;
        let max_redeliveries = parse_env_u32("WORKER_MAX_REDELIVERIES", 3)?;
        let step_delay_ms = parse_env_u64("TASK_STEP_DELAY_MS", 1000)?;

        if concurrency == 0 {
            return Err(AppError::Validation(
                "WORKER_CONCURRENCY must be greater than zero".to_owned(),
            ));
        }

        for (name, value) in [
            ("LOCK_TIMEOUT_SECONDS", lock_timeout_seconds),
            ("WORKER_POLL_TIMEOUT_SECONDS", poll_timeout_seconds),
            ("WORKER_HEARTBEAT_INTERVAL_SECONDS", heartbeat_interval_seconds),
            ("WORKER_ACTIVE_WINDOW_SECONDS", active_window_seconds),
        ] {
            if value == 0 {
                return Err(AppError::Validation(format!(
                    "{name} must be greater than zero"
                )));
            }
        }

        Ok(Self {
            redis_url,
            key_prefix,
            worker_id,
            concurrency,
            lock_timeout_seconds,
            poll_timeout_seconds,
            heartbeat_interval_seconds,
            active_window_seconds,
            max_redeliveries,
            step_delay_ms,
        })
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn required_env(name: &str) -> AppResult<String> {
    env::var(name).map_err(|_| AppError::Validation(format!("{name} is required")))
}

fn parse_env_usize(name: &str, default: usize) -> AppResult<usize> {
    match env::var(name) {
        Ok(value) => value.parse::<usize>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_u32(name: &str, default: u32) -> AppResult<u32> {
    match env::var(name) {
        Ok(value) => value.parse::<u32>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_u64(name: &str, default: u64) -> AppResult<u64> {
    match env::var(name) {
        Ok(value) => value.parse::<u64>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}
