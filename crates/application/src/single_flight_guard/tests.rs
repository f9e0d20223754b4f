use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use flightline_core::{AppError, AppResult};
use flightline_domain::{LockKey, LockLease};
use tokio::sync::{Barrier, Mutex, oneshot};

use super::{SingleFlightGuard, SingleFlightOutcome};
use crate::LockStore;

#[derive(Default)]
struct FakeLockStore {
    held: Mutex<HashMap<String, String>>,
    unavailable: AtomicBool,
    fail_release: AtomicBool,
    releases: AtomicUsize,
}

#[async_trait]
impl LockStore for FakeLockStore {
    async fn try_acquire(
        &self,
        key: &LockKey,
        holder_id: &str,
        timeout: Duration,
    ) -> AppResult<Option<LockLease>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::StoreUnavailable("lock store offline".to_owned()));
        }

        let mut held = self.held.lock().await;
        if held.contains_key(key.as_str()) {
            return Ok(None);
        }

        let token = format!("{holder_id}:{}", held.len());
        held.insert(key.as_str().to_owned(), token.clone());
        Ok(Some(LockLease {
            key: key.clone(),
            token,
            holder_id: holder_id.to_owned(),
            timeout,
        }))
    }

    async fn release(&self, lease: &LockLease) -> AppResult<()> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        if self.fail_release.load(Ordering::SeqCst) {
            return Err(AppError::StoreUnavailable("lock store offline".to_owned()));
        }

        let mut held = self.held.lock().await;
        if held.get(lease.key.as_str()) == Some(&lease.token) {
            held.remove(lease.key.as_str());
        }
        Ok(())
    }
}

fn key(item: &str) -> LockKey {
    LockKey::derive("relay_payload", Some(item)).unwrap_or_else(|_| unreachable!())
}

fn build_guard(store: Arc<FakeLockStore>) -> SingleFlightGuard {
    SingleFlightGuard::new(store, "worker-test", Duration::from_secs(60))
}

#[tokio::test]
async fn identical_keys_execute_exactly_once() {
    let store = Arc::new(FakeLockStore::default());
    let guard = build_guard(store.clone());
    let executions = Arc::new(AtomicUsize::new(0));
    let lock_key = key("abc");

    let (entered_tx, entered_rx) = oneshot::channel::<()>();
    let (finish_tx, finish_rx) = oneshot::channel::<()>();

    let first_executions = executions.clone();
    let first = guard.run(&lock_key, move || async move {
        first_executions.fetch_add(1, Ordering::SeqCst);
        let _ = entered_tx.send(());
        let _ = finish_rx.await;
        "first"
    });

    let second_executions = executions.clone();
    let second = async {
        let _ = entered_rx.await;
        let outcome = guard
            .run(&lock_key, move || async move {
                second_executions.fetch_add(1, Ordering::SeqCst);
                "second"
            })
            .await;
        let _ = finish_tx.send(());
        outcome
    };

    let (first, second) = tokio::join!(first, second);

    assert!(matches!(first, Ok(SingleFlightOutcome::Executed("first"))));
    assert!(matches!(second, Ok(SingleFlightOutcome::Skipped)));
    assert_eq!(executions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn distinct_keys_run_concurrently() {
    let store = Arc::new(FakeLockStore::default());
    let guard = build_guard(store);
    let barrier = Arc::new(Barrier::new(2));
    let left_key = key("left");
    let right_key = key("right");

    let left_barrier = barrier.clone();
    let right_barrier = barrier.clone();
    let both = async {
        tokio::join!(
            guard.run(&left_key, move || async move {
                left_barrier.wait().await;
            }),
            guard.run(&right_key, move || async move {
                right_barrier.wait().await;
            }),
        )
    };

    let result = tokio::time::timeout(Duration::from_secs(5), both).await;
    assert!(result.is_ok());
    let (left, right) = result.unwrap_or_else(|_| unreachable!());
    assert!(matches!(left, Ok(SingleFlightOutcome::Executed(()))));
    assert!(matches!(right, Ok(SingleFlightOutcome::Executed(()))));
}

#[tokio::test]
async fn lock_is_released_after_completion() {
    let store = Arc::new(FakeLockStore::default());
    let guard = build_guard(store.clone());
    let lock_key = key("abc");

    let first = guard.run(&lock_key, || async { 1 }).await;
    let second = guard.run(&lock_key, || async { 2 }).await;

    assert!(matches!(first, Ok(SingleFlightOutcome::Executed(1))));
    assert!(matches!(second, Ok(SingleFlightOutcome::Executed(2))));
    assert!(store.held.lock().await.is_empty());
}

#[tokio::test]
async fn lock_is_released_when_the_call_panics() {
    let store = Arc::new(FakeLockStore::default());
    let guard = build_guard(store.clone());
    let lock_key = key("abc");

    let panicking_guard = guard.clone();
    let panicking_key = lock_key.clone();
    let handle = tokio::spawn(async move {
        panicking_guard
            .run(&panicking_key, || async {
                panic!("handler exploded");
            })
            .await
    });

    let joined = handle.await;
    assert!(joined.is_err_and(|error| error.is_panic()));
    assert!(store.held.lock().await.is_empty());

    let retry = guard.run(&lock_key, || async { "again" }).await;
    assert!(matches!(retry, Ok(SingleFlightOutcome::Executed("again"))));
}

#[tokio::test]
async fn unavailable_store_fails_closed() {
    let store = Arc::new(FakeLockStore::default());
    store.unavailable.store(true, Ordering::SeqCst);
    let guard = build_guard(store);
    let invoked = Arc::new(AtomicBool::new(false));

    let flag = invoked.clone();
    let outcome = guard
        .run(&key("abc"), move || async move {
            flag.store(true, Ordering::SeqCst);
        })
        .await;

    assert!(outcome.is_err_and(|error| error.is_store_unavailable()));
    assert!(!invoked.load(Ordering::SeqCst));
}

#[tokio::test]
async fn release_failure_does_not_mask_the_result() {
    let store = Arc::new(FakeLockStore::default());
    store.fail_release.store(true, Ordering::SeqCst);
    let guard = build_guard(store.clone());

    let outcome = guard.run(&key("abc"), || async { "done" }).await;

    assert!(matches!(outcome, Ok(SingleFlightOutcome::Executed("done"))));
    assert_eq!(store.releases.load(Ordering::SeqCst), 1);
}

#[test]
fn skipped_outcome_has_no_value() {
    let outcome: SingleFlightOutcome<u8> = SingleFlightOutcome::Skipped;
    assert!(outcome.is_skipped());
    assert_eq!(outcome.into_executed(), None);
}
