use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use flightline_core::AppError;
use tracing_subscriber::EnvFilter;

/// Where submitted tasks run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskExecutionMode {
    /// Tasks run in an in-process worker pool over in-memory adapters.
    Inline,
    /// Tasks are queued in Redis and run by `flightline-worker` processes.
    Queued,
}

impl TaskExecutionMode {
    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "inline" => Ok(Self::Inline),
            "queued" => Ok(Self::Queued),
            other => Err(AppError::Validation(format!(
                "TASK_EXECUTION_MODE must be either 'inline' or 'queued', got '{other}'"
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inline => "inline",
            Self::Queued => "queued",
        }
    }
}

/// Worker pool settings used when tasks run inline.
#[derive(Debug, Clone)]
pub struct InlineWorkerConfig {
    pub concurrency: usize,
    pub lock_timeout: Duration,
    pub poll_interval: Duration,
    pub heartbeat_interval: Duration,
    pub max_redeliveries: u32,
    pub step_delay: Duration,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub api_host: String,
    pub api_port: u16,
    pub redis_url: Option<String>,
    pub execution_mode: TaskExecutionMode,
    pub key_prefix: String,
    pub default_group: String,
    pub default_task_name: String,
    pub socket_access_token: Option<String>,
    pub session_outbox_capacity: usize,
    pub worker_active_window: Duration,
    pub inline_worker: InlineWorkerConfig,
}

impl ApiConfig {
    pub fn load() -> Result<Self, AppError> {
        let api_host = env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".to_owned());
        let api_port = env::var("API_PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(3001);

        let execution_mode = TaskExecutionMode::parse(
            env::var("TASK_EXECUTION_MODE")
                .unwrap_or_else(|_| "queued".to_owned())
                .as_str(),
        )?;
        let redis_url = optional_non_empty_env("REDIS_URL");
        if execution_mode == TaskExecutionMode::Queued && redis_url.is_none() {
            return Err(AppError::Validation(
                "REDIS_URL is required when TASK_EXECUTION_MODE=queued".to_owned(),
            ));
        }

        let key_prefix = optional_non_empty_env("FLIGHTLINE_KEY_PREFIX")
            .unwrap_or_else(|| "flightline".to_owned());
        let default_group =
            optional_non_empty_env("DEFAULT_GROUP").unwrap_or_else(|| "default_group".to_owned());
        let default_task_name = optional_non_empty_env("DEFAULT_TASK_NAME")
            .unwrap_or_else(|| "relay_payload".to_owned());
        let socket_access_token = optional_non_empty_env("SOCKET_ACCESS_TOKEN");

        let session_outbox_capacity = parse_env_usize("SESSION_OUTBOX_CAPACITY", 256)?;
        if session_outbox_capacity == 0 {
            return Err(AppError::Validation(
                "SESSION_OUTBOX_CAPACITY must be greater than zero".to_owned(),
            ));
        }

        let worker_active_window =
            positive_seconds("WORKER_ACTIVE_WINDOW_SECONDS", 30)?;

        let concurrency = parse_env_usize("WORKER_CONCURRENCY", 4)?;
        if concurrency == 0 {
            return Err(AppError::Validation(
                "WORKER_CONCURRENCY must be greater than zero".to_owned(),
            ));
        }

        let inline_worker = InlineWorkerConfig {
            concurrency,
            lock_timeout: positive_seconds("LOCK_TIMEOUT_SECONDS", 600)?,
            poll_interval: positive_seconds("WORKER_POLL_TIMEOUT_SECONDS", 5)?,
            heartbeat_interval: positive_seconds("WORKER_HEARTBEAT_INTERVAL_SECONDS", 10)?,
            max_redeliveries: parse_env_u32("WORKER_MAX_REDELIVERIES", 3)?,
            step_delay: Duration::from_millis(parse_env_u64("TASK_STEP_DELAY_MS", 1000)?),
        };

        Ok(Self {
            api_host,
            api_port,
            redis_url,
            execution_mode,
            key_prefix,
            default_group,
            default_task_name,
            socket_access_token,
            session_outbox_capacity,
            worker_active_window,
            inline_worker,
        })
    }

    pub fn socket_address(&self) -> Result<SocketAddr, AppError> {
        let host = IpAddr::from_str(&self.api_host).map_err(|error| {
            AppError::Internal(format!("invalid API_HOST '{}': {error}", self.api_host))
        })?;
        Ok(SocketAddr::from((host, self.api_port)))
    }
}

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn optional_non_empty_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn positive_seconds(name: &str, default: u64) -> Result<Duration, AppError> {
    let seconds = parse_env_u64(name, default)?;
    if seconds == 0 {
        return Err(AppError::Validation(format!(
            "{name} must be greater than zero"
        )));
    }

    Ok(Duration::from_secs(seconds))
}

fn parse_env_usize(name: &str, default: usize) -> Result<usize, AppError> {
    match env::var(name) {
        Ok(value) => value.parse::<usize>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_u32(name: &str, default: u32) -> Result<u32, AppError> {
    match env::var(name) {
        Ok(value) => value.parse::<u32>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, AppError> {
    match env::var(name) {
        Ok(value) => value.parse::<u64>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}
