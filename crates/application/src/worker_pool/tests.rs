use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use flightline_core::{AppError, AppResult};
use flightline_domain::{
    GroupName, LockKey, LockLease, RelayEvent, TaskFailure, TaskState, TaskStatusRecord,
    TaskSubmission, WorkResult,
};
use serde_json::json;
use tokio::sync::{Semaphore, watch};
use uuid::Uuid;

use super::{WorkerPool, WorkerPoolConfig, WorkerPoolStats};
use crate::{
    InteractionRecorder, LockStore, RelayPublisher, SingleFlightGuard, TaskContext, TaskExecutor,
    TaskHandler, TaskRegistry, TaskStatusStore, WorkDispatcher, WorkSource, WorkerPresence,
};

#[derive(Default)]
struct FakeQueue {
    pending: Mutex<VecDeque<TaskSubmission>>,
}

impl FakeQueue {
    fn push(&self, submission: TaskSubmission) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(submission);
    }
}

#[async_trait]
impl WorkDispatcher for FakeQueue {
    async fn submit(&self, submission: TaskSubmission) -> AppResult<()> {
        self.push(submission);
        Ok(())
    }
}

#[async_trait]
impl WorkSource for FakeQueue {
    async fn next_submission(&self) -> AppResult<Option<TaskSubmission>> {
        Ok(self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front())
    }
}

#[derive(Default)]
struct FakeLockStore {
    held: Mutex<HashMap<String, String>>,
    unavailable: bool,
    acquire_calls: AtomicUsize,
}

#[async_trait]
impl LockStore for FakeLockStore {
    async fn try_acquire(
        &self,
        key: &LockKey,
        holder_id: &str,
        timeout: Duration,
    ) -> AppResult<Option<LockLease>> {
        self.acquire_calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable {
            return Err(AppError::StoreUnavailable("lock store offline".to_owned()));
        }

        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        if held.contains_key(key.as_str()) {
            return Ok(None);
        }
        let token = Uuid::new_v4().to_string();
        held.insert(key.as_str().to_owned(), token.clone());
        Ok(Some(LockLease {
            key: key.clone(),
            token,
            holder_id: holder_id.to_owned(),
            timeout,
        }))
    }

    async fn release(&self, lease: &LockLease) -> AppResult<()> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        if held.get(lease.key.as_str()) == Some(&lease.token) {
            held.remove(lease.key.as_str());
        }
        Ok(())
    }
}

struct NullPublisher;

#[async_trait]
impl RelayPublisher for NullPublisher {
    async fn publish(&self, _group: &GroupName, _event: &RelayEvent) -> AppResult<()> {
        Ok(())
    }
}

#[derive(Default)]
struct FakeStatusStore {
    records: Mutex<Vec<TaskStatusRecord>>,
}

impl FakeStatusStore {
    fn count(&self, state: TaskState) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|record| record.state == state)
            .count()
    }
}

#[async_trait]
impl TaskStatusStore for FakeStatusStore {
    async fn set_status(&self, record: TaskStatusRecord) -> AppResult<()> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
        Ok(())
    }

    async fn find_status(&self, task_id: Uuid) -> AppResult<Option<TaskStatusRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .rev()
            .find(|record| record.task_id == task_id)
            .cloned())
    }
}

struct NullRecorder;

#[async_trait]
impl InteractionRecorder for NullRecorder {
    async fn record(&self, _result: &WorkResult) -> AppResult<()> {
        Ok(())
    }
}

#[derive(Default)]
struct FakePresence {
    heartbeats: AtomicUsize,
}

#[async_trait]
impl WorkerPresence for FakePresence {
    async fn record_heartbeat(&self, _worker_id: &str) -> AppResult<()> {
        self.heartbeats.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn is_reachable(&self) -> AppResult<bool> {
        Ok(self.heartbeats.load(Ordering::SeqCst) > 0)
    }
}

/// Fails on payload "fail"; waits for a gate permit on payload "hold".
struct GatedTask {
    gate: Arc<Semaphore>,
}

#[async_trait]
impl TaskHandler for GatedTask {
    fn name(&self) -> &str {
        "gated"
    }

    async fn run(&self, context: &TaskContext) -> Result<(), TaskFailure> {
        match context.payload().as_str() {
            Some("fail") => Err(TaskFailure::new("ScriptedFailure", "asked to fail")),
            Some("hold") => {
                let permit = self.gate.acquire().await;
                drop(permit);
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

struct Harness {
    queue: Arc<FakeQueue>,
    lock_store: Arc<FakeLockStore>,
    statuses: Arc<FakeStatusStore>,
    presence: Arc<FakePresence>,
    gate: Arc<Semaphore>,
    max_redeliveries: u32,
}

impl Harness {
    fn new(lock_store: FakeLockStore) -> Self {
        Self {
            queue: Arc::new(FakeQueue::default()),
            lock_store: Arc::new(lock_store),
            statuses: Arc::new(FakeStatusStore::default()),
            presence: Arc::new(FakePresence::default()),
            gate: Arc::new(Semaphore::new(0)),
            max_redeliveries: 3,
        }
    }

    fn submit(&self, task_name: &str, item_key: &str, payload: &str) {
        let submission = TaskSubmission::new(
            task_name,
            GroupName::new("default_group").unwrap_or_else(|_| unreachable!()),
            Some(item_key.to_owned()),
            json!(payload),
        )
        .unwrap_or_else(|_| unreachable!());
        self.queue.push(submission);
    }

    fn pool(&self) -> WorkerPool {
        let executor = TaskExecutor::new(
            SingleFlightGuard::new(
                self.lock_store.clone(),
                "worker-test",
                Duration::from_secs(600),
            ),
            TaskRegistry::new().with_handler(Arc::new(GatedTask {
                gate: self.gate.clone(),
            })),
            Arc::new(NullPublisher),
            self.statuses.clone(),
            Arc::new(NullRecorder),
        );
        WorkerPool::new(
            WorkerPoolConfig {
                worker_id: "worker-test".to_owned(),
                concurrency: 2,
                poll_interval: Duration::from_millis(5),
                heartbeat_interval: Duration::from_millis(20),
                max_redeliveries: self.max_redeliveries,
                redelivery_delay: Duration::ZERO,
            },
            self.queue.clone(),
            self.queue.clone(),
            self.presence.clone(),
            executor,
        )
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    let reached = tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(reached.is_ok(), "condition not reached in time");
}

async fn stop(
    shutdown: watch::Sender<bool>,
    handle: tokio::task::JoinHandle<WorkerPoolStats>,
) -> WorkerPoolStats {
    assert!(shutdown.send(true).is_ok());
    let stats = tokio::time::timeout(Duration::from_secs(5), handle).await;
    assert!(stats.is_ok());
    let stats = stats.unwrap_or_else(|_| unreachable!());
    assert!(stats.is_ok());
    stats.unwrap_or_else(|_| unreachable!())
}

#[tokio::test]
async fn executes_queued_submissions_and_counts_outcomes() {
    let harness = Harness::new(FakeLockStore::default());
    harness.submit("gated", "a", "one");
    harness.submit("gated", "b", "two");
    harness.submit("gated", "c", "fail");
    let (shutdown, receiver) = watch::channel(false);
    let handle = tokio::spawn(harness.pool().run(receiver));

    let statuses = harness.statuses.clone();
    wait_until(|| {
        statuses.count(TaskState::Succeeded) == 2 && statuses.count(TaskState::Failed) == 1
    })
    .await;
    let stats = stop(shutdown, handle).await;

    assert_eq!(stats.succeeded, 2);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.skipped, 0);
    assert!(harness.presence.heartbeats.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn duplicate_item_is_skipped_while_first_execution_runs() {
    let harness = Harness::new(FakeLockStore::default());
    harness.submit("gated", "same", "hold");
    harness.submit("gated", "same", "hold");
    let (shutdown, receiver) = watch::channel(false);
    let handle = tokio::spawn(harness.pool().run(receiver));

    let statuses = harness.statuses.clone();
    wait_until(|| statuses.count(TaskState::Skipped) == 1).await;
    harness.gate.add_permits(1);
    wait_until(|| statuses.count(TaskState::Succeeded) == 1).await;
    let stats = stop(shutdown, handle).await;

    assert_eq!(stats.succeeded, 1);
    assert_eq!(stats.skipped, 1);
}

#[tokio::test]
async fn store_outage_redelivers_until_the_limit() {
    let mut harness = Harness::new(FakeLockStore {
        unavailable: true,
        ..FakeLockStore::default()
    });
    harness.max_redeliveries = 2;
    harness.submit("gated", "a", "one");
    let (shutdown, receiver) = watch::channel(false);
    let handle = tokio::spawn(harness.pool().run(receiver));

    let lock_store = harness.lock_store.clone();
    wait_until(|| lock_store.acquire_calls.load(Ordering::SeqCst) == 3).await;
    let stats = stop(shutdown, handle).await;

    assert_eq!(stats.redelivered, 2);
    assert_eq!(stats.abandoned, 1);
    assert_eq!(stats.succeeded, 0);
    assert_eq!(harness.statuses.count(TaskState::Running), 0);
}

#[tokio::test]
async fn unknown_task_is_abandoned_without_lock() {
    let harness = Harness::new(FakeLockStore::default());
    harness.submit("missing", "a", "one");
    harness.submit("gated", "b", "two");
    let (shutdown, receiver) = watch::channel(false);
    let handle = tokio::spawn(harness.pool().run(receiver));

    let statuses = harness.statuses.clone();
    wait_until(|| statuses.count(TaskState::Succeeded) == 1).await;
    let stats = stop(shutdown, handle).await;

    assert_eq!(stats.abandoned, 1);
    assert_eq!(harness.lock_store.acquire_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn shutdown_waits_for_in_flight_execution() {
    let harness = Harness::new(FakeLockStore::default());
    harness.submit("gated", "a", "hold");
    let (shutdown, receiver) = watch::channel(false);
    let handle = tokio::spawn(harness.pool().run(receiver));

    let statuses = harness.statuses.clone();
    wait_until(|| statuses.count(TaskState::Running) == 1).await;
    assert!(shutdown.send(true).is_ok());
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(!handle.is_finished());

    harness.gate.add_permits(1);
    let stats = tokio::time::timeout(Duration::from_secs(5), handle).await;
    assert!(stats.is_ok());
    let stats = stats.unwrap_or_else(|_| unreachable!());
    assert!(stats.is_ok_and(|stats| stats.succeeded == 1));
}

#[tokio::test]
async fn dropped_shutdown_sender_stops_an_idle_pool() {
    let harness = Harness::new(FakeLockStore::default());
    let (shutdown, receiver) = watch::channel(false);
    let handle = tokio::spawn(harness.pool().run(receiver));
    drop(shutdown);

    let stats = tokio::time::timeout(Duration::from_secs(5), handle).await;
    assert!(stats.is_ok());
    let stats = stats.unwrap_or_else(|_| unreachable!());
    assert!(stats.is_ok_and(|stats| stats == WorkerPoolStats::default()));
}
