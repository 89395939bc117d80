use cms_core::CmsError;
use thiserror::Error;

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

/// Infrastructure errors for queue operations
#[derive(Error, Debug, Clone)]
pub enum QueueError {
    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Invalid lease token")]
    InvalidLeaseToken,

    #[error("Lease has expired")]
    LeaseExpired,

    #[error("Job has been canceled")]
    JobCanceled,

    #[error("Job is already in terminal state")]
    JobAlreadyTerminal,

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Broker unavailable: {0}")]
    Unavailable(String),

    #[error("Worker shutdown")]
    WorkerShutdown,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Outcome of a failed task - determines retry behavior
#[derive(Error, Debug, Clone)]
pub enum JobError {
    /// Retryable error - will schedule retry if attempts remain
    #[error("Retryable error: {0}")]
    Retryable(String),

    /// Permanent error - fail immediately, no retry
    #[error("Permanent error: {0}")]
    Permanent(String),
}

impl JobError {
    pub fn retryable(msg: impl Into<String>) -> Self {
        Self::Retryable(msg.into())
    }

    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::Permanent(msg.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Retryable(msg) | Self::Permanent(msg) => msg,
        }
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

impl From<QueueError> for CmsError {
    fn from(err: QueueError) -> Self {
        let message = err.to_string();
        match err {
            QueueError::JobNotFound(_) => CmsError::not_found(message),
            QueueError::SerializationError(_) => CmsError::invalid_input(message),
            _ => CmsError::internal(message),
        }
        .with_source(err)
    }
}
