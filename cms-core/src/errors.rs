//! # Errors
//!
//! The asset engine reports failures through a single structured error,
//! [`CmsError`], whose [`ErrorKind`] is stable and transport-agnostic:
//! - every kind has a name, a kebab-cased class name and an HTTP-ish status
//! - lower layers keep their own `thiserror` enums and convert into `CmsError`
//! - the original cause rides along as an `anyhow::Error` source

use std::fmt;

use anyhow::Error as AnyError;

/// A convenience result type for the asset engine.
pub type CmsResult<T> = std::result::Result<T, CmsError>;

/// Error taxonomy of the asset engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,          // 404
    OperationDenied,   // 403
    InvalidOperator,   // 401
    AlreadyExists,     // 409
    PartialNotFound,   // 404
    TicketExpired,     // 410
    FileNotIncluded,   // 400
    Unsupported,       // 501
    InvalidInput,      // 400
    InvalidTransition, // 422
    TooLarge,          // 413
    PolicyViolation,   // 403
    Conflict,          // 409
    Io,                // 500
    Internal,          // 500
}

impl ErrorKind {
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::NotFound | ErrorKind::PartialNotFound => 404,
            ErrorKind::OperationDenied | ErrorKind::PolicyViolation => 403,
            ErrorKind::InvalidOperator => 401,
            ErrorKind::AlreadyExists | ErrorKind::Conflict => 409,
            ErrorKind::TicketExpired => 410,
            ErrorKind::FileNotIncluded | ErrorKind::InvalidInput => 400,
            ErrorKind::Unsupported => 501,
            ErrorKind::InvalidTransition => 422,
            ErrorKind::TooLarge => 413,
            ErrorKind::Io | ErrorKind::Internal => 500,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NotFound",
            ErrorKind::OperationDenied => "OperationDenied",
            ErrorKind::InvalidOperator => "InvalidOperator",
            ErrorKind::AlreadyExists => "AlreadyExists",
            ErrorKind::PartialNotFound => "PartialNotFound",
            ErrorKind::TicketExpired => "TicketExpired",
            ErrorKind::FileNotIncluded => "FileNotIncluded",
            ErrorKind::Unsupported => "Unsupported",
            ErrorKind::InvalidInput => "InvalidInput",
            ErrorKind::InvalidTransition => "InvalidTransition",
            ErrorKind::TooLarge => "TooLarge",
            ErrorKind::PolicyViolation => "PolicyViolation",
            ErrorKind::Conflict => "Conflict",
            ErrorKind::Io => "Io",
            ErrorKind::Internal => "Internal",
        }
    }

    /// Kebab-cased class name, e.g. `ticket-expired`.
    pub fn class_name(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not-found",
            ErrorKind::OperationDenied => "operation-denied",
            ErrorKind::InvalidOperator => "invalid-operator",
            ErrorKind::AlreadyExists => "already-exists",
            ErrorKind::PartialNotFound => "partial-not-found",
            ErrorKind::TicketExpired => "ticket-expired",
            ErrorKind::FileNotIncluded => "file-not-included",
            ErrorKind::Unsupported => "unsupported",
            ErrorKind::InvalidInput => "invalid-input",
            ErrorKind::InvalidTransition => "invalid-transition",
            ErrorKind::TooLarge => "too-large",
            ErrorKind::PolicyViolation => "policy-violation",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Io => "io",
            ErrorKind::Internal => "internal",
        }
    }
}

/// A structured asset-engine error.
#[derive(Debug)]
pub struct CmsError {
    pub kind: ErrorKind,
    pub message: String,
    pub source: Option<AnyError>,
}

impl CmsError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<AnyError>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Prefix the message with caller context such as `asset 01h...`.
    pub fn with_context(mut self, context: impl fmt::Display) -> Self {
        self.message = format!("{}: {}", context, self.message);
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }

    pub fn code(&self) -> u16 {
        self.kind.status_code()
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn class_name(&self) -> &'static str {
        self.kind.class_name()
    }

    /// Copy without the inner source, suitable for returning to clients.
    pub fn sanitize_for_client(&self) -> CmsError {
        CmsError::new(self.kind, self.message.clone())
    }

    /// Turn any error into a `CmsError`, keeping it lossless when it already is one.
    pub fn normalize(err: AnyError) -> CmsError {
        match err.downcast::<CmsError>() {
            Ok(cms) => cms,
            Err(other) => CmsError::new(ErrorKind::Internal, other.to_string()).with_source(other),
        }
    }

    /// JSON payload with `name`, `message`, `code` and `className`.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name(),
            "message": self.message,
            "code": self.code(),
            "className": self.class_name(),
        })
    }

    // ---- Constructors ----

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, msg)
    }
    pub fn operation_denied(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::OperationDenied, msg)
    }
    pub fn invalid_operator(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidOperator, msg)
    }
    pub fn already_exists(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::AlreadyExists, msg)
    }
    pub fn partial_not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::PartialNotFound, msg)
    }
    pub fn ticket_expired(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::TicketExpired, msg)
    }
    pub fn file_not_included(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::FileNotIncluded, msg)
    }
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unsupported, msg)
    }
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, msg)
    }
    pub fn invalid_transition(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidTransition, msg)
    }
    pub fn too_large(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::TooLarge, msg)
    }
    pub fn policy_violation(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::PolicyViolation, msg)
    }
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, msg)
    }
    pub fn io(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Io, msg)
    }
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, msg)
    }
}

impl fmt::Display for CmsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.name(), self.code(), self.message)
    }
}

impl std::error::Error for CmsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<std::io::Error> for CmsError {
    fn from(err: std::io::Error) -> Self {
        CmsError::io(err.to_string()).with_source(err)
    }
}

impl From<serde_json::Error> for CmsError {
    fn from(err: serde_json::Error) -> Self {
        CmsError::internal(format!("serialization: {}", err)).with_source(err)
    }
}

/// Early-return with a `CmsError` built from one of its constructors.
#[macro_export]
macro_rules! bail_cms {
    ($ctor:ident, $msg:expr) => {
        return Err($crate::errors::CmsError::$ctor($msg))
    };
    ($ctor:ident, $fmt:expr, $($arg:tt)*) => {
        return Err($crate::errors::CmsError::$ctor(format!($fmt, $($arg)*)))
    };
}
