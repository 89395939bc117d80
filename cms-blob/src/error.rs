use cms_core::{CmsError, ErrorKind};
use thiserror::Error;

/// Result type for gateway operations
pub type BlobResult<T> = Result<T, BlobError>;

/// Errors that can occur while talking to the object store
#[derive(Error, Debug)]
pub enum BlobError {
    #[error("Blob not found: {key}")]
    NotFound { key: String },

    #[error("Invalid request: {message}")]
    Invalid { message: String },

    #[error("Invalid file: {message}")]
    InvalidFile { message: String },

    #[error("File too large: {size} bytes (max: {max})")]
    TooLarge { size: u64, max: u64 },

    #[error("Operation not supported by this gateway: {operation}")]
    Unsupported { operation: &'static str },

    #[error("Storage backend error: {source}")]
    Backend {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl BlobError {
    /// Create a backend error from any error type
    pub fn backend<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend {
            source: Box::new(error),
        }
    }

    pub fn invalid<S: Into<String>>(message: S) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    pub fn invalid_file<S: Into<String>>(message: S) -> Self {
        Self::InvalidFile {
            message: message.into(),
        }
    }

    pub fn not_found<S: Into<String>>(key: S) -> Self {
        Self::NotFound { key: key.into() }
    }

    pub fn unsupported(operation: &'static str) -> Self {
        Self::Unsupported { operation }
    }
}

impl From<BlobError> for CmsError {
    fn from(err: BlobError) -> Self {
        let kind = match &err {
            BlobError::NotFound { .. } => ErrorKind::NotFound,
            BlobError::Invalid { .. } | BlobError::InvalidFile { .. } => ErrorKind::InvalidInput,
            BlobError::TooLarge { .. } => ErrorKind::TooLarge,
            BlobError::Unsupported { .. } => ErrorKind::Unsupported,
            BlobError::Io { .. } => ErrorKind::Io,
            BlobError::Backend { .. } => ErrorKind::Internal,
        };
        CmsError::new(kind, err.to_string()).with_source(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_into_cms_taxonomy() {
        let cases = [
            (BlobError::not_found("a/b"), ErrorKind::NotFound),
            (BlobError::invalid_file("empty"), ErrorKind::InvalidInput),
            (BlobError::TooLarge { size: 2, max: 1 }, ErrorKind::TooLarge),
            (BlobError::unsupported("issue_upload_link"), ErrorKind::Unsupported),
            (
                BlobError::from(std::io::Error::new(std::io::ErrorKind::Other, "disk")),
                ErrorKind::Io,
            ),
        ];
        for (err, kind) in cases {
            assert_eq!(CmsError::from(err).kind(), kind);
        }
    }
}
