//! Error types for building and executing a request task.
//!
//! Validation failures happen before any network I/O; transport failures
//! happen during the single call. `TaskError` joins the two so the host can
//! branch on which stage failed.

use thiserror::Error;

/// The parameter bag could not be turned into a request descriptor.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("task parameters must be a mapping")]
    NotAnObject,

    #[error("unsupported parameter: {0}")]
    UnsupportedParameter(String),

    #[error("missing required parameter: {0}")]
    MissingRequiredField(&'static str),

    #[error("invalid HTTP method: {0} (expected one of GET, POST, OPTIONS, HEAD, PUT, PATCH, DELETE)")]
    InvalidMethod(String),

    /// Exactly one of username/password was supplied.
    #[error("parameters are required together: username, password (missing {missing})")]
    IncompleteCredentials { missing: &'static str },

    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),

    #[error("invalid value for {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

impl ValidationError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ValidationError::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}

/// The transport capability failed to complete the exchange.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("TLS verification failed: {0}")]
    Tls(String),

    #[error("too many redirects: {0}")]
    TooManyRedirects(String),

    /// The descriptor could not be turned into a request by the transport,
    /// e.g. an unreadable CA bundle or a malformed proxy URL.
    #[error("transport rejected the request: {0}")]
    InvalidRequest(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Status line and headers were received but the body could not be read.
    #[error("failed to read response body (HTTP {status_code}): {message}")]
    Body { status_code: u16, message: String },
}

impl TransportError {
    /// Status code of the exchange, when it got far enough to have one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            TransportError::Body { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }
}

/// Any failure that terminates a task invocation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TaskError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl TaskError {
    /// Which stage failed: `"validation"` or `"transport"`.
    pub fn stage(&self) -> &'static str {
        match self {
            TaskError::Validation(_) => "validation",
            TaskError::Transport(_) => "transport",
        }
    }
}
