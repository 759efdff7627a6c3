//! Bounded-concurrency pod creation.
//!
//! Every request is queued up front. `concurrency` workers drain the queue,
//! requeueing retryable failures after a backoff, and report each final outcome
//! to the supervisor loop in [`CreationEngine::run_batch`], which is the only
//! place that counts. Once every request is accounted for the supervisor
//! cancels the workers.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use schedbench_client::ControlPlane;

use crate::error::CreateError;
use crate::factory::{CreateRequest, WorkBatch};
use crate::report::{AbandonedRequest, BatchReport};
use crate::retry::RetryPolicy;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of workers issuing creates in parallel.
    pub concurrency: usize,
    pub retry: RetryPolicy,
    /// How often progress is logged.
    pub progress_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            retry: RetryPolicy::default(),
            progress_interval: Duration::from_secs(1),
        }
    }
}

// ── Internal plumbing ─────────────────────────────────────────

struct Job {
    request: CreateRequest,
    attempts: u32,
}

enum Outcome {
    Created { attempts: u32 },
    Abandoned(AbandonedRequest),
}

type SharedQueue = Arc<Mutex<mpsc::Receiver<Job>>>;

struct Worker {
    id: usize,
    client: Arc<dyn ControlPlane>,
    retry: RetryPolicy,
    queue: SharedQueue,
    requeue: mpsc::Sender<Job>,
    outcomes: mpsc::UnboundedSender<Outcome>,
    cancel: CancellationToken,
}

impl Worker {
    async fn next_job(&self) -> Option<Job> {
        tokio::select! {
            _ = self.cancel.cancelled() => None,
            job = async { self.queue.lock().await.recv().await } => job,
        }
    }

    async fn run(self) {
        debug!(worker = self.id, "Creation worker started");
        while let Some(job) = self.next_job().await {
            if !self.process(job).await {
                break;
            }
        }
        debug!(worker = self.id, "Creation worker stopped");
    }

    /// Handle one job. Returns false when the worker should exit.
    async fn process(&self, mut job: Job) -> bool {
        job.attempts += 1;
        let request = &job.request;

        let err = match self.client.create_pod(request.namespace(), request.pod()).await {
            Ok(_) => {
                debug!(name = request.name(), attempts = job.attempts, "Pod created");
                return self.report(Outcome::Created { attempts: job.attempts });
            }
            Err(e) => e,
        };

        if err.is_already_exists() {
            if job.attempts > 1 {
                // An earlier attempt was committed but its response was lost.
                debug!(name = request.name(), attempts = job.attempts, "Pod already created by earlier attempt");
                return self.report(Outcome::Created { attempts: job.attempts });
            }
            warn!(name = request.name(), "Pod already exists before this run");
            return self.report(Outcome::Abandoned(AbandonedRequest {
                name: request.name().to_string(),
                attempts: job.attempts,
                reason: err.to_string(),
            }));
        }

        warn!(
            name = request.name(),
            attempt = job.attempts,
            error = %err,
            "Pod creation failed"
        );

        // 4xx other than throttling: the same body fails the same way again.
        if !err.is_retryable() || !self.retry.allows_retry(job.attempts) {
            return self.report(Outcome::Abandoned(AbandonedRequest {
                name: request.name().to_string(),
                attempts: job.attempts,
                reason: err.to_string(),
            }));
        }

        let delay = self.retry.backoff(job.attempts);
        tokio::select! {
            _ = self.cancel.cancelled() => return false,
            _ = tokio::time::sleep(delay) => {}
        }
        // Queue capacity equals the batch size, so this never waits.
        self.requeue.send(job).await.is_ok()
    }

    fn report(&self, outcome: Outcome) -> bool {
        self.outcomes.send(outcome).is_ok()
    }
}

// ── Engine ────────────────────────────────────────────────────

/// Submits a [`WorkBatch`] to a control plane with bounded concurrency.
pub struct CreationEngine {
    client: Arc<dyn ControlPlane>,
    config: EngineConfig,
}

impl CreationEngine {
    pub fn new(client: Arc<dyn ControlPlane>, config: EngineConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Create every request in `batch` and wait for the batch to settle.
    ///
    /// Returns [`CreateError::Incomplete`] with the partial report if any
    /// request was abandoned. With unbounded retries a request that never
    /// succeeds keeps this from returning.
    pub async fn run_batch(&self, batch: WorkBatch) -> Result<BatchReport, CreateError> {
        let concurrency = self.config.concurrency;
        if concurrency == 0 {
            return Err(CreateError::InvalidConcurrency);
        }

        let started = Instant::now();
        let total = batch.len();
        if total == 0 {
            info!("Empty batch, nothing to create");
            return Ok(BatchReport::default());
        }

        let (queue_tx, queue_rx) = mpsc::channel::<Job>(total);
        for request in batch.into_requests() {
            queue_tx
                .send(Job { request, attempts: 0 })
                .await
                .map_err(|_| CreateError::QueueClosed)?;
        }

        let queue: SharedQueue = Arc::new(Mutex::new(queue_rx));
        let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let worker_count = concurrency.min(total);
        info!(total, workers = worker_count, "Starting pod creation");

        // Dropping the set aborts any worker still running.
        let mut workers = JoinSet::new();
        for id in 0..worker_count {
            let worker = Worker {
                id,
                client: Arc::clone(&self.client),
                retry: self.config.retry,
                queue: Arc::clone(&queue),
                requeue: queue_tx.clone(),
                outcomes: outcome_tx.clone(),
                cancel: cancel.clone(),
            };
            workers.spawn(worker.run());
        }
        drop(outcome_tx);

        let mut report = BatchReport {
            requested: total,
            ..Default::default()
        };
        let interval = self.config.progress_interval.max(Duration::from_millis(10));
        let mut ticker = interval_at(Instant::now() + interval, interval);
        let mut queue_closed = false;

        // Every request settles exactly once, so a full count implies an
        // empty queue.
        while report.created + report.abandoned.len() < total {
            tokio::select! {
                outcome = outcome_rx.recv() => match outcome {
                    Some(Outcome::Created { attempts }) => {
                        report.created += 1;
                        report.attempts += u64::from(attempts);
                    }
                    Some(Outcome::Abandoned(item)) => {
                        report.attempts += u64::from(item.attempts);
                        report.abandoned.push(item);
                    }
                    None => {
                        queue_closed = true;
                        break;
                    }
                },
                _ = ticker.tick() => {
                    info!("{} pod(s) have been created.", report.created);
                }
            }
        }

        cancel.cancel();
        while workers.join_next().await.is_some() {}
        report.elapsed = started.elapsed();

        if queue_closed {
            return Err(CreateError::QueueClosed);
        }
        report.log_summary();
        if report.is_complete() {
            Ok(report)
        } else {
            Err(CreateError::Incomplete {
                report: Box::new(report),
            })
        }
    }
}
