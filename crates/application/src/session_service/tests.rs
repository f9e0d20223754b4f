use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use flightline_core::{AppError, AppResult, ClientIdentity};
use flightline_domain::{
    ACCEPTED_EVENT, GroupName, PoolStatus, REJECTED_EVENT, RelayEvent, ServerMessage,
    TaskSubmission,
};
use serde_json::json;
use tokio::sync::{Mutex, mpsc};

use super::{SessionService, derive_item_key};
use crate::{ChannelGroupRegistry, SessionHandle, WorkDispatcher, WorkerPresence};

const HELLO_SHA1: &str = "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d";

#[derive(Default)]
struct FakeDispatcher {
    submitted: Mutex<Vec<TaskSubmission>>,
    unavailable: AtomicBool,
}

#[async_trait]
impl WorkDispatcher for FakeDispatcher {
    async fn submit(&self, submission: TaskSubmission) -> AppResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::StoreUnavailable("queue offline".to_owned()));
        }
        self.submitted.lock().await.push(submission);
        Ok(())
    }
}

struct FakePresence {
    reachable: AppResult<bool>,
}

#[async_trait]
impl WorkerPresence for FakePresence {
    async fn record_heartbeat(&self, _worker_id: &str) -> AppResult<()> {
        Ok(())
    }

    async fn is_reachable(&self) -> AppResult<bool> {
        match &self.reachable {
            Ok(reachable) => Ok(*reachable),
            Err(_) => Err(AppError::StoreUnavailable("presence offline".to_owned())),
        }
    }
}

fn service(dispatcher: Arc<FakeDispatcher>, reachable: AppResult<bool>) -> SessionService {
    SessionService::new(
        Arc::new(ChannelGroupRegistry::new()),
        dispatcher,
        Arc::new(FakePresence { reachable }),
        GroupName::new("default_group").unwrap_or_else(|_| unreachable!()),
        "relay_payload",
    )
}

fn drain(receiver: &mut mpsc::Receiver<ServerMessage>) -> Vec<ServerMessage> {
    let mut messages = Vec::new();
    while let Ok(message) = receiver.try_recv() {
        messages.push(message);
    }
    messages
}

#[test]
fn item_key_is_hex_sha1() {
    assert_eq!(derive_item_key("hello"), HELLO_SHA1);
}

#[tokio::test]
async fn connect_greets_only_the_new_session() {
    let service = service(Arc::new(FakeDispatcher::default()), Ok(true));
    let (existing, mut existing_receiver) = SessionHandle::channel(8);
    let (joining, mut joining_receiver) = SessionHandle::channel(8);
    service
        .connect(&ClientIdentity::anonymous(), &existing)
        .await;
    drain(&mut existing_receiver);

    let status = service.connect(&ClientIdentity::anonymous(), &joining).await;

    assert_eq!(status, PoolStatus::Green);
    assert_eq!(
        drain(&mut joining_receiver),
        vec![
            ServerMessage::Ack,
            ServerMessage::Status {
                content: PoolStatus::Green
            }
        ]
    );
    assert!(drain(&mut existing_receiver).is_empty());
    assert_eq!(service.registry().members(service.default_group()).len(), 2);
}

#[tokio::test]
async fn failed_pool_probe_reports_red() {
    let service = service(
        Arc::new(FakeDispatcher::default()),
        Err(AppError::StoreUnavailable("down".to_owned())),
    );
    let (session, _receiver) = SessionHandle::channel(8);

    let status = service.connect(&ClientIdentity::anonymous(), &session).await;

    assert_eq!(status, PoolStatus::Red);
}

#[tokio::test]
async fn receive_acks_caller_notifies_group_and_submits_task() {
    let dispatcher = Arc::new(FakeDispatcher::default());
    let service = service(dispatcher.clone(), Ok(true));
    let (sender, mut sender_receiver) = SessionHandle::channel(8);
    let (watcher, mut watcher_receiver) = SessionHandle::channel(8);
    service.connect(&ClientIdentity::anonymous(), &sender).await;
    service.connect(&ClientIdentity::anonymous(), &watcher).await;
    drain(&mut sender_receiver);
    drain(&mut watcher_receiver);

    let submission = service.receive(&sender, "hello").await;
    assert!(submission.is_ok());
    let submission = submission.unwrap_or_else(|_| unreachable!());

    let accepted = ServerMessage::from(&RelayEvent::accepted("hello", HELLO_SHA1));
    assert_eq!(
        drain(&mut sender_receiver),
        vec![ServerMessage::Ack, accepted.clone()]
    );
    assert_eq!(drain(&mut watcher_receiver), vec![accepted]);

    assert_eq!(submission.item_key.as_deref(), Some(HELLO_SHA1));
    assert_eq!(submission.task_name.as_str(), "relay_payload");
    assert_eq!(submission.payload, json!("hello"));
    let submitted = dispatcher.submitted.lock().await;
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].task_id, submission.task_id);
}

#[tokio::test]
async fn queue_outage_is_reported_to_the_caller() {
    let dispatcher = Arc::new(FakeDispatcher::default());
    dispatcher.unavailable.store(true, Ordering::SeqCst);
    let service = service(dispatcher.clone(), Ok(true));
    let (sender, mut sender_receiver) = SessionHandle::channel(8);
    let (watcher, mut watcher_receiver) = SessionHandle::channel(8);
    service.connect(&ClientIdentity::anonymous(), &sender).await;
    service.connect(&ClientIdentity::anonymous(), &watcher).await;
    drain(&mut sender_receiver);
    drain(&mut watcher_receiver);

    let result = service.receive(&sender, "hello").await;

    assert!(result.is_err_and(|error| error.is_store_unavailable()));
    assert_eq!(
        drain(&mut sender_receiver),
        vec![
            ServerMessage::Ack,
            ServerMessage::Relay {
                event_type: REJECTED_EVENT.to_owned(),
                content: json!({"hash_key": HELLO_SHA1, "reason": "task queue unavailable"}),
            }
        ]
    );
    assert!(drain(&mut watcher_receiver).is_empty());
    assert!(dispatcher.submitted.lock().await.is_empty());
}

#[tokio::test]
async fn disconnected_session_stops_receiving_group_sends() {
    let service = service(Arc::new(FakeDispatcher::default()), Ok(true));
    let (leaving, mut leaving_receiver) = SessionHandle::channel(8);
    let (staying, mut staying_receiver) = SessionHandle::channel(8);
    service.connect(&ClientIdentity::anonymous(), &leaving).await;
    service.connect(&ClientIdentity::anonymous(), &staying).await;
    drain(&mut leaving_receiver);
    drain(&mut staying_receiver);

    assert_eq!(service.disconnect(leaving.id()), 1);
    let report = service.registry().send(
        service.default_group(),
        &RelayEvent::new(ACCEPTED_EVENT, json!({})),
    );

    assert_eq!(report.delivered, 1);
    assert!(drain(&mut leaving_receiver).is_empty());
    assert_eq!(drain(&mut staying_receiver).len(), 1);
    assert_eq!(service.disconnect(leaving.id()), 0);
}
