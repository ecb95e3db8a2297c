//! Crate-wide error taxonomy.
//!
//! Mirrors the error classes described for NetPulse: validation failures and
//! missing rows are client-caused and map to specific HTTP status codes at
//! the API boundary; storage and protocol errors are propagated from the
//! layer that detects them; probe failures are recovered locally by the
//! probes themselves and never surface here.

use thiserror::Error;

pub type NetPulseResult<T> = Result<T, NetPulseError>;

#[derive(Debug, Error)]
pub enum NetPulseError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("fatal startup error: {0}")]
    Fatal(String),
}

impl NetPulseError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// HTTP status code this error maps to at the API boundary (spec.md §7).
    pub fn status_code(&self) -> u16 {
        match self {
            NetPulseError::Validation(_) => 400,
            NetPulseError::NotFound(_) => 404,
            NetPulseError::Auth(_) => 401,
            NetPulseError::Storage(_) => 500,
            NetPulseError::Protocol(_) => 400,
            NetPulseError::Fatal(_) => 500,
        }
    }
}

impl From<sqlx::Error> for NetPulseError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => NetPulseError::NotFound("no rows found".to_string()),
            other => NetPulseError::Storage(other.to_string()),
        }
    }
}

impl From<std::io::Error> for NetPulseError {
    fn from(err: std::io::Error) -> Self {
        NetPulseError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for NetPulseError {
    fn from(err: serde_json::Error) -> Self {
        NetPulseError::Protocol(err.to_string())
    }
}
