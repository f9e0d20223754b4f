//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod lock;
mod message;
mod relay;
mod session;
mod task;

pub use lock::{LockKey, LockLease};
pub use message::{ClientMessage, PoolStatus, ServerMessage};
pub use relay::{
    ACCEPTED_EVENT, COMPLETED_EVENT, FAILED_EVENT, PROGRESS_EVENT, REJECTED_EVENT, RelayEvent,
};
pub use session::{GroupName, SessionId};
pub use task::{TaskFailure, TaskState, TaskStatusRecord, TaskSubmission, WorkResult};
