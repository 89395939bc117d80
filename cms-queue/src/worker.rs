use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::{JobError, JobId, QueueBackend, QueueError, QueueResult, TaskPayload};

/// Configuration for workers and the leases they hold
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub lease_duration: Duration,
    /// Idle wait between empty polls
    pub poll_interval: Duration,
    pub base_retry_backoff: Duration,
    pub max_retry_backoff: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            lease_duration: Duration::from_secs(300),
            poll_interval: Duration::from_millis(100),
            base_retry_backoff: Duration::from_secs(1),
            max_retry_backoff: Duration::from_secs(3600),
        }
    }
}

impl QueueConfig {
    /// base * 2^(attempt-1), capped at the max.
    pub fn retry_backoff(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        std::cmp::min(
            self.base_retry_backoff.saturating_mul(factor),
            self.max_retry_backoff,
        )
    }

    pub fn retry_at(&self, attempt: u32, now: DateTime<Utc>) -> DateTime<Utc> {
        let backoff = chrono::Duration::from_std(self.retry_backoff(attempt))
            .unwrap_or_else(|_| chrono::Duration::seconds(3600));
        now + backoff
    }
}

/// Executes one kind of work pulled off the queue
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, job_id: &JobId, payload: TaskPayload) -> Result<(), JobError>;
}

/// Handle for managing worker lifecycle
pub struct WorkerHandle {
    shutdown_tx: oneshot::Sender<()>,
    join_handle: JoinHandle<QueueResult<()>>,
}

impl WorkerHandle {
    /// Stop after the job in hand, if any.
    pub async fn shutdown(self) -> QueueResult<()> {
        let _ = self.shutdown_tx.send(());
        self.join_handle
            .await
            .map_err(|e| QueueError::Internal(format!("worker join error: {e}")))?
    }
}

pub struct Worker<B: QueueBackend + ?Sized> {
    backend: Arc<B>,
    handler: Arc<dyn TaskHandler>,
    queues: Vec<String>,
    config: QueueConfig,
}

impl<B: QueueBackend + ?Sized + 'static> Worker<B> {
    pub fn new(backend: Arc<B>, handler: Arc<dyn TaskHandler>) -> Self {
        Self {
            backend,
            handler,
            queues: vec![crate::DEFAULT_QUEUE.to_string()],
            config: QueueConfig::default(),
        }
    }

    pub fn with_queues(mut self, queues: Vec<String>) -> Self {
        self.queues = queues;
        self
    }

    pub fn with_config(mut self, config: QueueConfig) -> Self {
        self.config = config;
        self
    }

    pub fn spawn(self) -> WorkerHandle {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let join_handle = tokio::spawn(self.run(shutdown_rx));
        WorkerHandle {
            shutdown_tx,
            join_handle,
        }
    }

    async fn run(self, mut shutdown_rx: oneshot::Receiver<()>) -> QueueResult<()> {
        info!(queues = ?self.queues, "worker started");

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    info!("worker shutdown requested");
                    break;
                }
                result = self.process_next() => {
                    match result {
                        Ok(true) => {}
                        Ok(false) => tokio::time::sleep(self.config.poll_interval).await,
                        Err(e) => {
                            error!(error = %e, "error processing job");
                            tokio::time::sleep(self.config.poll_interval * 10).await;
                        }
                    }
                }
            }
        }

        info!("worker stopped");
        Ok(())
    }

    /// Lease and handle a single job. Returns false when nothing was eligible.
    pub async fn process_next(&self) -> QueueResult<bool> {
        let queues: Vec<&str> = self.queues.iter().map(String::as_str).collect();
        let Some(leased) = self.backend.dequeue(&queues).await? else {
            return Ok(false);
        };

        let job_id = leased.job_id().clone();
        let attempt = leased.record.attempt;
        debug!(job_id = %job_id, job_type = %leased.record.message.job_type, attempt, "processing job");

        let outcome = match leased.payload() {
            Ok(payload) => self.handler.handle(&job_id, payload).await,
            Err(e) => Err(JobError::permanent(e.to_string())),
        };

        match outcome {
            Ok(()) => {
                self.backend
                    .ack_complete(&job_id, &leased.lease_token)
                    .await?;
                info!(job_id = %job_id, "job completed");
            }
            Err(job_error) => {
                let retry_at = (job_error.is_retryable()
                    && attempt < leased.record.message.max_retries)
                    .then(|| self.config.retry_at(attempt, Utc::now()));

                self.backend
                    .ack_fail(
                        &job_id,
                        &leased.lease_token,
                        job_error.message().to_string(),
                        retry_at,
                    )
                    .await?;

                if retry_at.is_some() {
                    warn!(job_id = %job_id, error = %job_error, "job failed, will retry");
                } else {
                    error!(job_id = %job_id, error = %job_error, "job failed permanently");
                }
            }
        }

        Ok(true)
    }
}
