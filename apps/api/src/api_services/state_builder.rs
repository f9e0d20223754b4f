use std::sync::Arc;

use flightline_application::{
    ChannelGroupRegistry, RelayPayloadTask, SessionService, SingleFlightGuard, TaskExecutor,
    TaskRegistry, WorkDispatcher, WorkerPool, WorkerPoolConfig, WorkerPresence,
};
use flightline_core::AppError;
use flightline_domain::GroupName;
use flightline_infrastructure::{
    InMemoryLockStore, InMemoryTaskStatusStore, InMemoryWorkQueue, InMemoryWorkerPresence,
    RedisKeyspace, RedisRelaySubscriber, RedisWorkQueue, RedisWorkerPresence,
    TracingInteractionRecorder, connect_redis, open_redis_client,
};
use redis::aio::ConnectionManager;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::api_config::{ApiConfig, InlineWorkerConfig, TaskExecutionMode};
use crate::state::{AppState, TaskQueueHandle};

/// Application state plus the background tasks serving it.
pub struct ApiRuntime {
    pub state: AppState,
    pub background_tasks: Vec<JoinHandle<()>>,
}

struct TaskBackend {
    dispatcher: Arc<dyn WorkDispatcher>,
    queue: TaskQueueHandle,
    presence: Arc<dyn WorkerPresence>,
    background_task: JoinHandle<()>,
}

pub async fn build_app_state(
    config: &ApiConfig,
    shutdown: watch::Receiver<bool>,
) -> Result<ApiRuntime, AppError> {
    let registry = Arc::new(ChannelGroupRegistry::new());
    let keyspace = RedisKeyspace::new(config.key_prefix.as_str());
    let default_group = GroupName::new(config.default_group.as_str())?;

    let redis_client = config
        .redis_url
        .as_deref()
        .map(open_redis_client)
        .transpose()?;
    let redis_connection = match redis_client.as_ref() {
        Some(client) => Some(connect_redis(client).await?),
        None => None,
    };

    let backend = match config.execution_mode {
        TaskExecutionMode::Queued => {
            let (Some(client), Some(connection)) = (redis_client, redis_connection.clone()) else {
                return Err(AppError::Validation(
                    "REDIS_URL is required when TASK_EXECUTION_MODE=queued".to_owned(),
                ));
            };
            build_queued_backend(config, client, connection, keyspace, registry.clone(), shutdown)
        }
        TaskExecutionMode::Inline => build_inline_backend(config, registry.clone(), shutdown),
    };

    info!(
        execution_mode = config.execution_mode.as_str(),
        default_group = %default_group,
        task_name = %config.default_task_name,
        "task backend ready"
    );

    Ok(ApiRuntime {
        state: AppState {
            session_service: SessionService::new(
                registry,
                backend.dispatcher,
                backend.presence,
                default_group,
                config.default_task_name.as_str(),
            ),
            redis_connection,
            task_queue: backend.queue,
            execution_mode: config.execution_mode,
            socket_access_token: config.socket_access_token.clone(),
            session_outbox_capacity: config.session_outbox_capacity,
        },
        background_tasks: vec![backend.background_task],
    })
}

fn build_queued_backend(
    config: &ApiConfig,
    client: redis::Client,
    connection: ConnectionManager,
    keyspace: RedisKeyspace,
    registry: Arc<ChannelGroupRegistry>,
    shutdown: watch::Receiver<bool>,
) -> TaskBackend {
    let subscriber = RedisRelaySubscriber::new(client, keyspace.clone(), registry);
    let queue = RedisWorkQueue::new(connection.clone(), keyspace.clone());

    TaskBackend {
        dispatcher: Arc::new(queue.clone()),
        queue: TaskQueueHandle::Redis(queue),
        presence: Arc::new(RedisWorkerPresence::new(
            connection,
            keyspace,
            config.worker_active_window,
        )),
        background_task: tokio::spawn(subscriber.run(shutdown)),
    }
}

fn build_inline_backend(
    config: &ApiConfig,
    registry: Arc<ChannelGroupRegistry>,
    shutdown: watch::Receiver<bool>,
) -> TaskBackend {
    let worker: &InlineWorkerConfig = &config.inline_worker;
    let worker_id = format!("inline-{}", std::process::id());
    let queue = Arc::new(InMemoryWorkQueue::new());
    let presence = Arc::new(InMemoryWorkerPresence::new(config.worker_active_window));

    let executor = TaskExecutor::new(
        SingleFlightGuard::new(
            Arc::new(InMemoryLockStore::new()),
            worker_id.as_str(),
            worker.lock_timeout,
        ),
        TaskRegistry::new().with_handler(Arc::new(RelayPayloadTask::new(worker.step_delay))),
        registry,
        Arc::new(InMemoryTaskStatusStore::new()),
        Arc::new(TracingInteractionRecorder),
    );
    let pool = WorkerPool::new(
        WorkerPoolConfig {
            worker_id,
            concurrency: worker.concurrency,
            poll_interval: worker.poll_interval,
            heartbeat_interval: worker.heartbeat_interval,
            max_redeliveries: worker.max_redeliveries,
            redelivery_delay: worker.poll_interval,
        },
        queue.clone(),
        queue.clone(),
        presence.clone(),
        executor,
    );

    TaskBackend {
        dispatcher: queue.clone(),
        queue: TaskQueueHandle::InMemory(queue),
        presence,
        background_task: tokio::spawn(async move {
            pool.run(shutdown).await;
        }),
    }
}
