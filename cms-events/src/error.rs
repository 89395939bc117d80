use thiserror::Error;

/// Why a single webhook delivery attempt did not land
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// Endpoint answered with a non-2xx status
    #[error("endpoint responded with status {0}")]
    Status(u16),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("payload encoding failed: {0}")]
    Encode(String),
}

impl DeliveryError {
    /// Encoding problems will not go away on a second try.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Encode(_))
    }
}

impl From<serde_json::Error> for DeliveryError {
    fn from(err: serde_json::Error) -> Self {
        Self::Encode(err.to_string())
    }
}
