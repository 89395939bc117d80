use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{QueueResult, TaskPayload};

pub const DEFAULT_QUEUE: &str = "tasks";
pub const JSON_CODEC: &str = "json";

/// Unique identifier for a job
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Lease token for job processing - prevents concurrent processing
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeaseToken(pub String);

impl LeaseToken {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for LeaseToken {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for LeaseToken {
    fn from(token: &str) -> Self {
        Self(token.to_string())
    }
}

/// Immutable submission data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobMessage {
    pub job_type: String,
    /// Encoded [`TaskPayload`]
    pub payload_bytes: Vec<u8>,
    pub codec: String,
    pub queue: String,
    pub max_retries: u32,
    /// When the job becomes eligible
    pub run_at: DateTime<Utc>,
}

impl JobMessage {
    pub fn encode(payload: &TaskPayload) -> QueueResult<Self> {
        Ok(Self {
            job_type: payload.job_type().to_string(),
            payload_bytes: serde_json::to_vec(payload)?,
            codec: JSON_CODEC.to_string(),
            queue: DEFAULT_QUEUE.to_string(),
            max_retries: 3,
            run_at: Utc::now(),
        })
    }

    pub fn decode(&self) -> QueueResult<TaskPayload> {
        Ok(serde_json::from_slice(&self.payload_bytes)?)
    }

    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = queue.into();
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_run_at(mut self, run_at: DateTime<Utc>) -> Self {
        self.run_at = run_at;
        self
    }
}

/// Job status lifecycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JobStatus {
    Enqueued,
    Scheduled { run_at: DateTime<Utc> },
    Processing { lease_until: DateTime<Utc> },
    Retrying { retry_at: DateTime<Utc> },
    Completed { completed_at: DateTime<Utc> },
    Failed { failed_at: DateTime<Utc>, error: String },
    Canceled { canceled_at: DateTime<Utc> },
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed { .. } | Self::Failed { .. } | Self::Canceled { .. }
        )
    }

    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        match self {
            Self::Enqueued => true,
            Self::Scheduled { run_at } => *run_at <= now,
            Self::Retrying { retry_at } => *retry_at <= now,
            _ => false,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Enqueued => "enqueued",
            Self::Scheduled { .. } => "scheduled",
            Self::Processing { .. } => "processing",
            Self::Retrying { .. } => "retrying",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
            Self::Canceled { .. } => "canceled",
        }
    }
}

/// Mutable runtime state stored by a backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: JobId,
    pub message: JobMessage,
    pub status: JobStatus,
    /// Number of leases handed out so far
    pub attempt: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub lease_token: Option<LeaseToken>,
    pub lease_until: Option<DateTime<Utc>>,
}

impl JobRecord {
    pub fn new(job_id: JobId, message: JobMessage) -> Self {
        let now = Utc::now();
        let status = if message.run_at > now {
            JobStatus::Scheduled { run_at: message.run_at }
        } else {
            JobStatus::Enqueued
        };

        Self {
            job_id,
            message,
            status,
            attempt: 0,
            created_at: now,
            updated_at: now,
            last_error: None,
            lease_token: None,
            lease_until: None,
        }
    }

    pub fn lease_expired(&self, now: DateTime<Utc>) -> bool {
        match (&self.status, &self.lease_until) {
            (JobStatus::Processing { .. }, Some(lease_until)) => *lease_until < now,
            _ => false,
        }
    }

    pub fn start_processing(&mut self, lease_token: LeaseToken, lease_until: DateTime<Utc>) {
        self.status = JobStatus::Processing { lease_until };
        self.attempt += 1;
        self.lease_token = Some(lease_token);
        self.lease_until = Some(lease_until);
        self.updated_at = Utc::now();
    }

    pub fn complete(&mut self) {
        self.status = JobStatus::Completed { completed_at: Utc::now() };
        self.release();
    }

    pub fn fail(&mut self, error: String) {
        self.status = JobStatus::Failed {
            failed_at: Utc::now(),
            error: error.clone(),
        };
        self.last_error = Some(error);
        self.release();
    }

    pub fn schedule_retry(&mut self, retry_at: DateTime<Utc>, error: String) {
        self.status = JobStatus::Retrying { retry_at };
        self.last_error = Some(error);
        self.release();
    }

    /// Put an expired lease back in line.
    pub fn reclaim(&mut self) {
        self.status = JobStatus::Enqueued;
        self.release();
    }

    pub fn cancel(&mut self) {
        self.status = JobStatus::Canceled { canceled_at: Utc::now() };
        self.release();
    }

    fn release(&mut self) {
        self.lease_token = None;
        self.lease_until = None;
        self.updated_at = Utc::now();
    }
}

/// A job that has been leased for processing
#[derive(Debug, Clone)]
pub struct LeasedJob {
    pub record: JobRecord,
    pub lease_token: LeaseToken,
    pub lease_until: DateTime<Utc>,
}

impl LeasedJob {
    pub fn job_id(&self) -> &JobId {
        &self.record.job_id
    }

    pub fn payload(&self) -> QueueResult<TaskPayload> {
        self.record.message.decode()
    }
}

/// Event protocol for observability
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobEvent {
    Enqueued {
        job_id: JobId,
        queue: String,
        job_type: String,
        at: DateTime<Utc>,
    },
    Leased {
        job_id: JobId,
        lease_until: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    Retrying {
        job_id: JobId,
        retry_at: DateTime<Utc>,
        error: String,
        at: DateTime<Utc>,
    },
    Completed {
        job_id: JobId,
        at: DateTime<Utc>,
    },
    Failed {
        job_id: JobId,
        error: String,
        at: DateTime<Utc>,
    },
    Canceled {
        job_id: JobId,
        at: DateTime<Utc>,
    },
    LeaseExpired {
        job_id: JobId,
        at: DateTime<Utc>,
    },
}

impl JobEvent {
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Enqueued { .. } => "enqueued",
            Self::Leased { .. } => "leased",
            Self::Retrying { .. } => "retrying",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
            Self::Canceled { .. } => "canceled",
            Self::LeaseExpired { .. } => "lease_expired",
        }
    }

    pub fn job_id(&self) -> &JobId {
        match self {
            Self::Enqueued { job_id, .. }
            | Self::Leased { job_id, .. }
            | Self::Retrying { job_id, .. }
            | Self::Completed { job_id, .. }
            | Self::Failed { job_id, .. }
            | Self::Canceled { job_id, .. }
            | Self::LeaseExpired { job_id, .. } => job_id,
        }
    }
}
