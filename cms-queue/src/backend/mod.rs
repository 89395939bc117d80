mod memory;
mod reaper;

pub use memory::MemoryBackend;
pub use reaper::LeaseReaper;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::{JobEvent, JobId, JobMessage, JobRecord, JobStatus, LeaseToken, LeasedJob, QueueResult};

/// Storage primitives a dispatcher and its workers run on
#[async_trait]
pub trait QueueBackend: Send + Sync {
    async fn enqueue(&self, message: JobMessage) -> QueueResult<JobId>;

    /// Lease the first eligible job across `queues`, in the order given.
    async fn dequeue(&self, queues: &[&str]) -> QueueResult<Option<LeasedJob>>;

    /// Acknowledge completion (cancel wins, lease token required)
    async fn ack_complete(&self, job_id: &JobId, lease_token: &LeaseToken) -> QueueResult<()>;

    /// Acknowledge failure; `retry_at` puts the job back in line, `None` fails it for good.
    async fn ack_fail(
        &self,
        job_id: &JobId,
        lease_token: &LeaseToken,
        error: String,
        retry_at: Option<DateTime<Utc>>,
    ) -> QueueResult<()>;

    /// Returns false when the job was already terminal.
    async fn cancel(&self, job_id: &JobId) -> QueueResult<bool>;

    async fn status(&self, job_id: &JobId) -> QueueResult<JobStatus>;

    async fn record(&self, job_id: &JobId) -> QueueResult<JobRecord>;

    fn subscribe(&self) -> broadcast::Receiver<JobEvent>;
}
