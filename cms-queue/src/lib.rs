//! Background task dispatch for the asset engine.
//!
//! The orchestrator only needs [`TaskDispatcher`]: `run` accepts a [`TaskPayload`]
//! and returns once the job is queued. [`QueueDispatcher`] puts jobs on a
//! [`QueueBackend`]; [`Worker`]s lease them back out, hand them to a
//! [`TaskHandler`] and acknowledge the outcome, rescheduling retryable failures
//! with exponential backoff. Leases that outlive their worker are reclaimed by
//! the [`LeaseReaper`].

pub mod backend;
pub mod dispatcher;
pub mod error;
pub mod payload;
pub mod types;
pub mod worker;

pub use backend::{LeaseReaper, MemoryBackend, QueueBackend};
pub use dispatcher::{QueueDispatcher, RecordingDispatcher, TaskDispatcher};
pub use error::{JobError, QueueError, QueueResult};
pub use payload::{CopyTask, DecompressTask, ImportTask, TaskPayload};
pub use types::{
    JobEvent, JobId, JobMessage, JobRecord, JobStatus, LeaseToken, LeasedJob, DEFAULT_QUEUE,
    JSON_CODEC,
};
pub use worker::{QueueConfig, TaskHandler, Worker, WorkerHandle};
