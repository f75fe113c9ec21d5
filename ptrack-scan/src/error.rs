//! Error types for ptrack-scan
//!
//! [`ApiError`] covers calls to the process-record service; [`ScanError`]
//! covers misuse of the scan engine (no session, wrong mode, ...). Neither is
//! fatal to a scanning session: a failed scan becomes operator feedback.

use ptrack_common::{ProcessType, ScanMode};
use thiserror::Error;

/// Errors from the process-record service
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Transport failure (connect, timeout, TLS)
    #[error("Network error: {0}")]
    Network(String),

    /// HTTP 404: unknown product (or product not yet bootstrapped)
    #[error("Not found: {0}")]
    NotFound(String),

    /// HTTP 409 or a claim held by someone else
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Any other refusal, with the service's detail message
    #[error("Rejected ({status}): {detail}")]
    Rejected { status: u16, detail: String },

    /// Response body did not match the expected shape
    #[error("Parse error: {0}")]
    Parse(String),

    /// Client could not be constructed
    #[error("Client setup error: {0}")]
    Setup(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Parse(err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

/// Errors from driving the scan engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    #[error("No active scan session")]
    NoSession,

    #[error("Operator name is not set")]
    NoOperator,

    #[error("{0} does not support continuous scanning")]
    ContinuousNotAllowed(ProcessType),

    #[error("Operation requires {expected} mode, session is in {actual} mode")]
    WrongMode { expected: ScanMode, actual: ScanMode },

    #[error("A batch upload is already in progress")]
    UploadInProgress,

    #[error("Queue is empty")]
    NothingToUpload,
}

/// Convenience Result type for service calls
pub type ApiResult<T> = std::result::Result<T, ApiError>;
