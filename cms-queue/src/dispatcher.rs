use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{info, instrument};

use crate::{JobId, JobMessage, QueueBackend, QueueError, QueueResult, TaskPayload};

/// Accepts background work. Returns once the job is accepted, not when it finishes.
#[async_trait]
pub trait TaskDispatcher: Send + Sync {
    async fn run(&self, payload: TaskPayload) -> QueueResult<JobId>;

    /// Re-enqueue an earlier job's payload.
    async fn retry(&self, job_id: &JobId) -> QueueResult<JobId>;
}

/// Dispatcher over a [`QueueBackend`]
pub struct QueueDispatcher<B: QueueBackend + ?Sized> {
    backend: Arc<B>,
    queue: String,
    max_retries: u32,
}

impl<B: QueueBackend + ?Sized> QueueDispatcher<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            queue: crate::DEFAULT_QUEUE.to_string(),
            max_retries: 3,
        }
    }

    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = queue.into();
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    fn message(&self, payload: &TaskPayload) -> QueueResult<JobMessage> {
        Ok(JobMessage::encode(payload)?
            .with_queue(self.queue.clone())
            .with_max_retries(self.max_retries))
    }
}

#[async_trait]
impl<B: QueueBackend + ?Sized> TaskDispatcher for QueueDispatcher<B> {
    #[instrument(skip(self, payload), fields(job_type = payload.job_type(), queue = %self.queue))]
    async fn run(&self, payload: TaskPayload) -> QueueResult<JobId> {
        let job_id = self.backend.enqueue(self.message(&payload)?).await?;
        info!(job_id = %job_id, "enqueued task");
        Ok(job_id)
    }

    /// A job still in flight is left alone and its id returned.
    #[instrument(skip(self), fields(job_id = %job_id))]
    async fn retry(&self, job_id: &JobId) -> QueueResult<JobId> {
        let record = self.backend.record(job_id).await?;
        if !record.status.is_terminal() {
            return Ok(job_id.clone());
        }

        let payload = record.message.decode()?;
        let retried = self.backend.enqueue(self.message(&payload)?).await?;
        info!(retried = %retried, "re-enqueued task");
        Ok(retried)
    }
}

/// Records payloads instead of queueing them.
#[derive(Clone, Default)]
pub struct RecordingDispatcher {
    runs: Arc<Mutex<Vec<(JobId, TaskPayload)>>>,
    fail: Arc<AtomicBool>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following call fail with [`QueueError::Unavailable`].
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn payloads(&self) -> Vec<TaskPayload> {
        self.runs.lock().iter().map(|(_, p)| p.clone()).collect()
    }

    pub fn job_ids(&self) -> Vec<JobId> {
        self.runs.lock().iter().map(|(id, _)| id.clone()).collect()
    }

    fn check(&self) -> QueueResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(QueueError::Unavailable("dispatcher offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl TaskDispatcher for RecordingDispatcher {
    async fn run(&self, payload: TaskPayload) -> QueueResult<JobId> {
        self.check()?;
        let job_id = JobId::new();
        self.runs.lock().push((job_id.clone(), payload));
        Ok(job_id)
    }

    async fn retry(&self, job_id: &JobId) -> QueueResult<JobId> {
        self.check()?;
        let payload = self
            .runs
            .lock()
            .iter()
            .find(|(id, _)| id == job_id)
            .map(|(_, p)| p.clone())
            .ok_or_else(|| QueueError::JobNotFound(job_id.to_string()))?;
        self.run(payload).await
    }
}
