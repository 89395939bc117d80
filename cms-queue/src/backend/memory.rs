use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::debug;

use super::QueueBackend;
use crate::{
    JobEvent, JobId, JobMessage, JobRecord, JobStatus, LeaseToken, LeasedJob, QueueConfig,
    QueueError, QueueResult,
};

const EVENT_CAPACITY: usize = 1000;

/// In-memory backend for tests and single-process deployments
#[derive(Clone)]
pub struct MemoryBackend {
    pub(crate) jobs: Arc<RwLock<HashMap<JobId, JobRecord>>>,
    /// queue name -> job ids in submission order
    pub(crate) queues: Arc<RwLock<HashMap<String, VecDeque<JobId>>>>,
    pub(crate) events: broadcast::Sender<JobEvent>,
    lease_duration: Duration,
}

impl MemoryBackend {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            queues: Arc::new(RwLock::new(HashMap::new())),
            events,
            lease_duration: Duration::from_secs(300),
        }
    }

    pub fn from_config(config: &QueueConfig) -> Self {
        Self::new().with_lease_duration(config.lease_duration)
    }

    pub fn with_lease_duration(mut self, lease_duration: Duration) -> Self {
        self.lease_duration = lease_duration;
        self
    }

    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.read().is_empty()
    }

    /// Jobs currently in line for `queue`, including ones not yet eligible.
    pub fn pending(&self, queue: &str) -> usize {
        self.queues.read().get(queue).map_or(0, VecDeque::len)
    }

    pub(crate) fn emit(&self, event: JobEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    pub(crate) fn requeue(&self, job_id: &JobId, queue: &str) {
        self.queues
            .write()
            .entry(queue.to_string())
            .or_default()
            .push_back(job_id.clone());
    }

    /// Move a leased job's deadline into the past.
    pub fn force_lease_expiry(&self, job_id: &JobId) -> QueueResult<()> {
        let mut jobs = self.jobs.write();
        let record = jobs
            .get_mut(job_id)
            .ok_or_else(|| QueueError::JobNotFound(job_id.to_string()))?;

        let expired = Utc::now() - chrono::Duration::seconds(1);
        if let JobStatus::Processing { .. } = record.status {
            record.status = JobStatus::Processing { lease_until: expired };
            record.lease_until = Some(expired);
        }
        Ok(())
    }

    /// Run one reclaim pass without a background task.
    pub fn run_reaper_tick(&self) -> usize {
        super::LeaseReaper::new(self.clone()).reap_expired_leases()
    }

    fn lease_until(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + chrono::Duration::from_std(self.lease_duration)
            .unwrap_or_else(|_| chrono::Duration::seconds(300))
    }

    fn check_lease(
        record: &JobRecord,
        lease_token: &LeaseToken,
        now: DateTime<Utc>,
    ) -> QueueResult<()> {
        if let JobStatus::Canceled { .. } = record.status {
            return Err(QueueError::JobCanceled);
        }
        if record.status.is_terminal() {
            return Err(QueueError::JobAlreadyTerminal);
        }
        if record.lease_token.as_ref() != Some(lease_token) {
            return Err(QueueError::InvalidLeaseToken);
        }
        match record.lease_until {
            Some(lease_until) if now > lease_until => Err(QueueError::LeaseExpired),
            _ => Ok(()),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueBackend for MemoryBackend {
    async fn enqueue(&self, message: JobMessage) -> QueueResult<JobId> {
        let job_id = JobId::new();
        let now = Utc::now();
        let queue = message.queue.clone();
        let job_type = message.job_type.clone();

        self.jobs
            .write()
            .insert(job_id.clone(), JobRecord::new(job_id.clone(), message));
        self.requeue(&job_id, &queue);

        self.emit(JobEvent::Enqueued {
            job_id: job_id.clone(),
            queue,
            job_type,
            at: now,
        });
        Ok(job_id)
    }

    async fn dequeue(&self, queues: &[&str]) -> QueueResult<Option<LeasedJob>> {
        let now = Utc::now();
        let mut lines = self.queues.write();
        let mut jobs = self.jobs.write();

        for queue_name in queues {
            let Some(line) = lines.get_mut(*queue_name) else {
                continue;
            };

            // drop anything canceled or finished while waiting
            line.retain(|id| jobs.get(id).is_some_and(|r| !r.status.is_terminal()));

            let Some(index) = line
                .iter()
                .position(|id| jobs.get(id).is_some_and(|r| r.status.is_eligible(now)))
            else {
                continue;
            };

            let Some(job_id) = line.remove(index) else {
                continue;
            };
            let Some(record) = jobs.get_mut(&job_id) else {
                continue;
            };

            let lease_token = LeaseToken::new();
            let lease_until = self.lease_until(now);
            record.start_processing(lease_token.clone(), lease_until);
            debug!(job_id = %job_id, attempt = record.attempt, "leased job");

            self.emit(JobEvent::Leased {
                job_id: job_id.clone(),
                lease_until,
                at: now,
            });
            return Ok(Some(LeasedJob {
                record: record.clone(),
                lease_token,
                lease_until,
            }));
        }

        Ok(None)
    }

    async fn ack_complete(&self, job_id: &JobId, lease_token: &LeaseToken) -> QueueResult<()> {
        let now = Utc::now();
        {
            let mut jobs = self.jobs.write();
            let record = jobs
                .get_mut(job_id)
                .ok_or_else(|| QueueError::JobNotFound(job_id.to_string()))?;
            Self::check_lease(record, lease_token, now)?;
            record.complete();
        }

        self.emit(JobEvent::Completed {
            job_id: job_id.clone(),
            at: now,
        });
        Ok(())
    }

    async fn ack_fail(
        &self,
        job_id: &JobId,
        lease_token: &LeaseToken,
        error: String,
        retry_at: Option<DateTime<Utc>>,
    ) -> QueueResult<()> {
        let now = Utc::now();
        let queue = {
            let mut jobs = self.jobs.write();
            let record = jobs
                .get_mut(job_id)
                .ok_or_else(|| QueueError::JobNotFound(job_id.to_string()))?;
            Self::check_lease(record, lease_token, now)?;

            match retry_at {
                Some(retry_at) => record.schedule_retry(retry_at, error.clone()),
                None => record.fail(error.clone()),
            }
            record.message.queue.clone()
        };

        match retry_at {
            Some(retry_at) => {
                self.requeue(job_id, &queue);
                self.emit(JobEvent::Retrying {
                    job_id: job_id.clone(),
                    retry_at,
                    error,
                    at: now,
                });
            }
            None => self.emit(JobEvent::Failed {
                job_id: job_id.clone(),
                error,
                at: now,
            }),
        }
        Ok(())
    }

    async fn cancel(&self, job_id: &JobId) -> QueueResult<bool> {
        {
            let mut jobs = self.jobs.write();
            let record = jobs
                .get_mut(job_id)
                .ok_or_else(|| QueueError::JobNotFound(job_id.to_string()))?;
            if record.status.is_terminal() {
                return Ok(false);
            }
            record.cancel();
        }

        self.emit(JobEvent::Canceled {
            job_id: job_id.clone(),
            at: Utc::now(),
        });
        Ok(true)
    }

    async fn status(&self, job_id: &JobId) -> QueueResult<JobStatus> {
        self.jobs
            .read()
            .get(job_id)
            .map(|record| record.status.clone())
            .ok_or_else(|| QueueError::JobNotFound(job_id.to_string()))
    }

    async fn record(&self, job_id: &JobId) -> QueueResult<JobRecord> {
        self.jobs
            .read()
            .get(job_id)
            .cloned()
            .ok_or_else(|| QueueError::JobNotFound(job_id.to_string()))
    }

    fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }
}
