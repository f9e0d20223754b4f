//! Application services and ports.

#![forbid(unsafe_code)]

mod channel_group_registry;
mod lock_ports;
mod relay_payload_task;
mod relay_ports;
mod session_service;
mod single_flight_guard;
mod task_executor;
mod work_ports;
mod worker_pool;

pub use channel_group_registry::{
    ChannelGroupRegistry, DeliveryFailure, DeliveryReport, SessionHandle,
};
pub use lock_ports::LockStore;
pub use relay_payload_task::{RELAY_PAYLOAD_TASK, RelayPayloadTask};
pub use relay_ports::RelayPublisher;
pub use session_service::{SessionService, derive_item_key};
pub use single_flight_guard::{SingleFlightGuard, SingleFlightOutcome};
pub use task_executor::{TaskContext, TaskExecution, TaskExecutor, TaskHandler, TaskRegistry};
pub use work_ports::{
    InteractionRecorder, TaskStatusStore, WorkDispatcher, WorkSource, WorkerPresence,
};
pub use worker_pool::{WorkerPool, WorkerPoolConfig, WorkerPoolStats};
