//! Batch execution over a bounded worker pool.
//!
//! Workers pull statements from a shared queue, run each one with retries,
//! and report through a completion channel. A single aggregator drains the
//! channel and keeps the success and failure counts, so completion order is
//! irrelevant.

use serde::Serialize;
use std::collections::VecDeque;
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::poller::CompletionPoller;
use super::submitter::Submitter;
use crate::client::{ClientManager, WorkerId};
use crate::config::PollingConfig;
use crate::error::{AuditError, Result};
use crate::service::ExecutionStatus;

/// Aggregate result of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub submitted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// True iff every submitted statement succeeded.
    pub verdict: bool,
}

impl BatchOutcome {
    /// Builds an outcome; the verdict follows from the counts.
    pub fn new(submitted: usize, succeeded: usize, failed: usize) -> Self {
        Self {
            submitted,
            succeeded,
            failed,
            verdict: succeeded == submitted,
        }
    }

    /// Turns a negative verdict into `BatchFailed`.
    pub fn into_result(self) -> Result<Self> {
        if self.verdict {
            Ok(self)
        } else {
            Err(AuditError::BatchFailed {
                submitted: self.submitted,
                succeeded: self.succeeded,
                failed: self.failed,
            })
        }
    }

    /// Fraction of statements finished, successful or not.
    pub fn progress(&self) -> f64 {
        if self.submitted == 0 {
            1.0
        } else {
            (self.succeeded + self.failed) as f64 / self.submitted as f64
        }
    }
}

/// What happened to one statement across its attempts.
#[derive(Debug, Clone)]
pub struct StatementReport {
    /// Position of the statement in the submitted batch.
    pub index: usize,
    pub statement: String,
    /// Attempts made, between 1 and the configured maximum.
    pub attempts: u32,
    /// Status of the last attempt that got one.
    pub status: Option<ExecutionStatus>,
    /// Error of the last attempt that failed locally.
    pub last_error: Option<String>,
}

impl StatementReport {
    fn new(index: usize, statement: &str) -> Self {
        Self {
            index,
            statement: statement.to_string(),
            attempts: 0,
            status: None,
            last_error: None,
        }
    }

    /// True iff the final attempt succeeded.
    pub fn succeeded(&self) -> bool {
        self.status.as_ref().is_some_and(ExecutionStatus::success)
    }
}

/// Runs a statement to completion, retrying failed attempts.
#[derive(Debug, Clone)]
pub struct StatementRunner {
    clients: Arc<ClientManager>,
    submitter: Submitter,
    poller: CompletionPoller,
    polling: PollingConfig,
}

impl StatementRunner {
    /// Creates a runner with the retry budget from `polling`.
    pub fn new(
        clients: Arc<ClientManager>,
        submitter: Submitter,
        poller: CompletionPoller,
        polling: &PollingConfig,
    ) -> Self {
        Self {
            clients,
            submitter,
            poller,
            polling: polling.clone(),
        }
    }

    /// Submits and awaits `statement` up to `max_attempts` times.
    ///
    /// An attempt fails when it errors locally or ends in anything but
    /// SUCCEEDED. Attempt `n` is followed by an `n * n` unit back-off when
    /// another attempt remains.
    pub async fn run(&self, worker: WorkerId, index: usize, statement: &str) -> StatementReport {
        let mut report = StatementReport::new(index, statement);
        let max_attempts = self.polling.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            report.attempts = attempt;
            match self.attempt(worker, statement).await {
                Ok(status) if status.success() => {
                    report.status = Some(status);
                    return report;
                }
                Ok(status) => {
                    warn!(
                        "Attempt {}/{} on {}: {}",
                        attempt, max_attempts, worker, status
                    );
                    report.status = Some(status);
                }
                Err(err) => {
                    warn!(
                        "Attempt {}/{} on {} failed: {}",
                        attempt, max_attempts, worker, err
                    );
                    report.last_error = Some(err.to_string());
                }
            }

            if attempt < max_attempts {
                tokio::time::sleep(self.polling.backoff_after(attempt)).await;
            }
        }

        error!(
            "Statement #{} failed after {} attempts: {}",
            index, report.attempts, statement
        );
        report
    }

    /// Drops the client of a worker that has finished.
    fn release(&self, worker: WorkerId) {
        self.clients.release(worker);
    }

    async fn attempt(&self, worker: WorkerId, statement: &str) -> Result<ExecutionStatus> {
        let client = self.clients.handle_for(worker).await?;
        let handle = self
            .submitter
            .submit(client.as_ref(), statement, None, None)
            .await?;
        Ok(self.poller.await_completion(worker, &handle).await)
    }
}

type TaskQueue = Mutex<VecDeque<(usize, String)>>;

fn next_task(queue: &TaskQueue) -> Option<(usize, String)> {
    queue
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .pop_front()
}

/// Executes independent statements concurrently.
///
/// Clones share the worker numbering, so batches running at the same time
/// never share a worker id or its client.
#[derive(Debug, Clone)]
pub struct BatchOrchestrator {
    runner: StatementRunner,
    assigned_workers: Arc<AtomicUsize>,
}

impl BatchOrchestrator {
    /// Creates an orchestrator running statements with `runner`.
    pub fn new(runner: StatementRunner) -> Self {
        Self {
            runner,
            assigned_workers: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Reserves `count` batch worker numbers not handed out before.
    fn reserve_workers(&self, count: usize) -> RangeInclusive<usize> {
        let base = self.assigned_workers.fetch_add(count, Ordering::Relaxed);
        (base + 1)..=(base + count)
    }

    /// Runs all statements on `pool_size` workers (clamped to `1..=len`).
    ///
    /// Returns the outcome only when every statement succeeded; otherwise
    /// fails with `BatchFailed`. Completed work is never rolled back.
    pub async fn execute_all(&self, statements: Vec<String>, pool_size: usize) -> Result<BatchOutcome> {
        let total = statements.len();
        if total == 0 {
            debug!("Empty batch, nothing to execute");
            return Ok(BatchOutcome::new(0, 0, 0));
        }

        let workers = pool_size.clamp(1, total);
        info!("Executing {} statements with {} workers", total, workers);
        let started = Instant::now();

        let queue: Arc<TaskQueue> = Arc::new(Mutex::new(
            statements.into_iter().enumerate().collect(),
        ));
        let (tx, mut rx) = mpsc::unbounded_channel::<StatementReport>();
        let mut pool = JoinSet::new();

        for n in self.reserve_workers(workers) {
            let queue = Arc::clone(&queue);
            let tx = tx.clone();
            let runner = self.runner.clone();
            pool.spawn(async move {
                let worker = WorkerId::batch(n);
                while let Some((index, statement)) = next_task(&queue) {
                    let report = runner.run(worker, index, &statement).await;
                    if tx.send(report).is_err() {
                        break;
                    }
                }
                runner.release(worker);
            });
        }
        drop(tx);

        let mut outcome = BatchOutcome::new(total, 0, 0);
        while outcome.succeeded + outcome.failed < total {
            let Some(report) = rx.recv().await else {
                break;
            };
            if report.succeeded() {
                outcome.succeeded += 1;
                debug!("Statement #{} succeeded: {}", report.index, report.statement);
            } else {
                outcome.failed += 1;
            }
            info!(
                "{:.0}% completed {}, failed {}, total {}",
                outcome.progress() * 100.0,
                outcome.succeeded,
                outcome.failed,
                total
            );
        }

        while let Some(joined) = pool.join_next().await {
            if let Err(e) = joined {
                error!("Batch worker stopped abnormally: {}", e);
            }
        }

        // statements lost to a crashed worker never reported back
        let unreported = total - outcome.succeeded - outcome.failed;
        let outcome = BatchOutcome::new(total, outcome.succeeded, outcome.failed + unreported);

        info!(
            "Batch of {} statements on {} workers took {:.1?}: {} succeeded, {} failed",
            total,
            workers,
            started.elapsed(),
            outcome.succeeded,
            outcome.failed
        );
        outcome.into_result()
    }
}
