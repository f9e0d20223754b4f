//! Bounded pool of task executions fed by a work source.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use flightline_domain::{TaskState, TaskSubmission};
use tokio::sync::{Semaphore, watch};
use tracing::{error, info, warn};

use crate::{TaskExecutor, WorkDispatcher, WorkSource, WorkerPresence};

/// Runtime settings of one worker pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerPoolConfig {
    /// Identity used for heartbeats and lock ownership logs.
    pub worker_id: String,
    /// Maximum number of executions in flight.
    pub concurrency: usize,
    /// Sleep between polls of an empty queue.
    pub poll_interval: Duration,
    /// Interval between presence heartbeats.
    pub heartbeat_interval: Duration,
    /// How often a submission is requeued after a store outage.
    pub max_redeliveries: u32,
    /// Pause before a submission is requeued.
    pub redelivery_delay: Duration,
}

/// Counters reported when the pool stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerPoolStats {
    /// Executions that ran to success.
    pub succeeded: u64,
    /// Executions that ran and failed.
    pub failed: u64,
    /// Submissions dropped as duplicates by the single-flight guard.
    pub skipped: u64,
    /// Submissions requeued after a store outage.
    pub redelivered: u64,
    /// Submissions abandoned without an execution.
    pub abandoned: u64,
}

#[derive(Default)]
struct Counters {
    succeeded: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
    redelivered: AtomicU64,
    abandoned: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> WorkerPoolStats {
        WorkerPoolStats {
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            redelivered: self.redelivered.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
        }
    }
}

/// Pulls submissions and runs them to completion with bounded concurrency.
pub struct WorkerPool {
    config: WorkerPoolConfig,
    source: Arc<dyn WorkSource>,
    dispatcher: Arc<dyn WorkDispatcher>,
    presence: Arc<dyn WorkerPresence>,
    executor: TaskExecutor,
}

impl WorkerPool {
    /// Creates a worker pool.
    ///
    /// `dispatcher` must feed the same queue as `source`; it is used for
    /// redelivery.
    #[must_use]
    pub fn new(
        config: WorkerPoolConfig,
        source: Arc<dyn WorkSource>,
        dispatcher: Arc<dyn WorkDispatcher>,
        presence: Arc<dyn WorkerPresence>,
        executor: TaskExecutor,
    ) -> Self {
        Self {
            config,
            source,
            dispatcher,
            presence,
            executor,
        }
    }

    /// Runs until `shutdown` turns true or its sender is dropped.
    ///
    /// Stops claiming on shutdown and waits for in-flight executions; a
    /// running task is never cancelled.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> WorkerPoolStats {
        let concurrency = self.config.concurrency.max(1);
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let counters = Arc::new(Counters::default());
        let heartbeat = tokio::spawn(heartbeat_loop(
            self.presence.clone(),
            self.config.worker_id.clone(),
            self.config.heartbeat_interval,
            shutdown.clone(),
        ));

        let poll_interval_ms =
            u64::try_from(self.config.poll_interval.as_millis()).unwrap_or(u64::MAX);
        info!(
            worker_id = %self.config.worker_id,
            concurrency,
            poll_interval_ms,
            "worker pool started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let permit = tokio::select! {
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            };

            match self.source.next_submission().await {
                Ok(Some(submission)) => {
                    let executor = self.executor.clone();
                    let dispatcher = self.dispatcher.clone();
                    let counters = counters.clone();
                    let config = self.config.clone();
                    tokio::spawn(async move {
                        process_submission(
                            &executor,
                            dispatcher.as_ref(),
                            &counters,
                            &config,
                            submission,
                        )
                        .await;
                        drop(permit);
                    });
                }
                Ok(None) => {
                    drop(permit);
                    if idle(self.config.poll_interval, &mut shutdown).await {
                        break;
                    }
                }
                Err(error) => {
                    drop(permit);
                    warn!(
                        worker_id = %self.config.worker_id,
                        error = %error,
                        "failed to claim task submission"
                    );
                    if idle(self.config.poll_interval, &mut shutdown).await {
                        break;
                    }
                }
            }
        }

        info!(worker_id = %self.config.worker_id, "worker pool draining in-flight tasks");
        let permits = u32::try_from(concurrency).unwrap_or(u32::MAX);
        if semaphore.acquire_many(permits).await.is_err() {
            warn!(
                worker_id = %self.config.worker_id,
                "worker pool semaphore closed while draining"
            );
        }
        heartbeat.abort();

        let stats = counters.snapshot();
        info!(
            worker_id = %self.config.worker_id,
            succeeded = stats.succeeded,
            failed = stats.failed,
            skipped = stats.skipped,
            redelivered = stats.redelivered,
            abandoned = stats.abandoned,
            "worker pool stopped"
        );
        stats
    }
}

async fn process_submission(
    executor: &TaskExecutor,
    dispatcher: &dyn WorkDispatcher,
    counters: &Counters,
    config: &WorkerPoolConfig,
    submission: TaskSubmission,
) {
    let task_id = submission.task_id;
    match executor.execute(submission.clone()).await {
        Ok(execution) => match execution.state {
            TaskState::Failed => Counters::bump(&counters.failed),
            TaskState::Skipped => Counters::bump(&counters.skipped),
            _ => Counters::bump(&counters.succeeded),
        },
        Err(error) if error.is_store_unavailable() => {
            if submission.delivery_attempt >= config.max_redeliveries {
                error!(
                    worker_id = %config.worker_id,
                    task_id = %task_id,
                    attempts = submission.delivery_attempt,
                    error = %error,
                    "abandoning task submission after repeated store outages"
                );
                Counters::bump(&counters.abandoned);
                return;
            }

            warn!(
                worker_id = %config.worker_id,
                task_id = %task_id,
                attempt = submission.delivery_attempt,
                error = %error,
                "lock store unavailable, requeueing task submission"
            );
            tokio::time::sleep(config.redelivery_delay).await;
            match dispatcher.submit(submission.redelivered()).await {
                Ok(()) => Counters::bump(&counters.redelivered),
                Err(error) => {
                    error!(
                        worker_id = %config.worker_id,
                        task_id = %task_id,
                        error = %error,
                        "failed to requeue task submission"
                    );
                    Counters::bump(&counters.abandoned);
                }
            }
        }
        Err(error) => {
            warn!(
                worker_id = %config.worker_id,
                task_id = %task_id,
                task_name = %submission.task_name,
                error = %error,
                "task submission rejected"
            );
            Counters::bump(&counters.abandoned);
        }
    }
}

async fn heartbeat_loop(
    presence: Arc<dyn WorkerPresence>,
    worker_id: String,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(every.max(Duration::from_millis(1)));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(error) = presence.record_heartbeat(worker_id.as_str()).await {
                    warn!(
                        worker_id = %worker_id,
                        error = %error,
                        "failed to publish worker heartbeat"
                    );
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return;
                }
            }
        }
    }
}

/// Sleeps for one poll interval. Returns true when shutdown was requested.
async fn idle(poll_interval: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        () = tokio::time::sleep(poll_interval) => false,
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}

#[cfg(test)]
mod tests;
