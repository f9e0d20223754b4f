//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod in_memory_lock_store;
mod in_memory_task_status_store;
mod in_memory_work_queue;
mod in_memory_worker_presence;
mod redis_connection;
mod redis_keyspace;
mod redis_lock_store;
mod redis_relay_publisher;
mod redis_relay_subscriber;
mod redis_task_status_store;
mod redis_work_queue;
mod redis_worker_presence;
mod tracing_interaction_recorder;

pub use in_memory_lock_store::InMemoryLockStore;
pub use in_memory_task_status_store::InMemoryTaskStatusStore;
pub use in_memory_work_queue::InMemoryWorkQueue;
pub use in_memory_worker_presence::InMemoryWorkerPresence;
pub use redis_connection::{connect_redis, open_redis_client, ping_redis};
pub use redis_keyspace::RedisKeyspace;
pub use redis_lock_store::RedisLockStore;
pub use redis_relay_publisher::RedisRelayPublisher;
pub use redis_relay_subscriber::{RedisRelaySubscriber, decode_relay_message};
pub use redis_task_status_store::RedisTaskStatusStore;
pub use redis_work_queue::RedisWorkQueue;
pub use redis_worker_presence::RedisWorkerPresence;
pub use tracing_interaction_recorder::TracingInteractionRecorder;
