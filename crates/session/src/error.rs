//! Error types for the session lifecycle

use std::time::Duration;
use thiserror::Error;

/// Errors raised by the session lifecycle components.
///
/// None of these cross a task boundary uncaught: the scheduler, monitors and
/// coordinator log them and move on. They are returned to direct callers of
/// [`crate::RenewalExecutor::renew`] and friends.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Renewal rejected with status {status}: {body}")]
    RenewalRejected { status: u16, body: String },

    #[error("Malformed renewal response: {0}")]
    MalformedResponse(String),

    /// A concurrent renewal this caller waited on failed
    #[error("Renewal failed: {0}")]
    RenewalFailed(String),

    #[error("Renewal timed out after {0:?}")]
    Timeout(Duration),

    #[error("Missing credential")]
    MissingCredential,

    #[error("Session framework error: {0}")]
    FrameworkError(String),
}

impl SessionError {
    /// Create a new session framework error
    pub fn framework<T: std::fmt::Display>(msg: T) -> Self {
        SessionError::FrameworkError(msg.to_string())
    }
}
