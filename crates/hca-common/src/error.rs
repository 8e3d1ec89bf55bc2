//! Error types for HCA orchestration

use std::time::Duration;
use thiserror::Error;

/// Result type alias for HCA operations
pub type Result<T> = std::result::Result<T, HcaError>;

/// Main error type for HCA orchestration
#[derive(Error, Debug)]
pub enum HcaError {
    /// An internal step was invoked in a state it must never be reached from.
    #[error("Precondition violated: {0}")]
    Precondition(String),

    /// A remote API answered with a non-success HTTP status.
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("job_id {job_id} did not complete successfully: {reason}")]
    JobFailed { job_id: String, reason: String },

    #[error("Exceeded max wait time of {waited:?} polling job_id {job_id}")]
    Timeout { job_id: String, waited: Duration },

    /// Structural check on a loaded dataset found a discrepancy.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl HcaError {
    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }

    pub fn api(status: u16, msg: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: msg.into(),
        }
    }

    pub fn job_failed(job_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::JobFailed {
            job_id: job_id.into(),
            reason: reason.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Server-side (5xx) failures are worth retrying; everything else is final.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Api { status, .. } if (500..600).contains(status))
    }
}

impl From<reqwest::Error> for HcaError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::api(status.as_u16(), err.to_string()),
            None => Self::Network(err.to_string()),
        }
    }
}

impl From<csv::Error> for HcaError {
    fn from(err: csv::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_server_errors_are_transient() {
        assert!(HcaError::api(502, "bad gateway").is_transient());
        assert!(HcaError::api(500, "internal").is_transient());
        assert!(!HcaError::api(404, "not found").is_transient());
        assert!(!HcaError::api(429, "slow down").is_transient());
        assert!(!HcaError::Network("connection reset".into()).is_transient());
        assert!(!HcaError::job_failed("abc", "failed").is_transient());
    }

    #[test]
    fn test_job_failed_message_names_job() {
        let err = HcaError::job_failed("test_job", "job status failed");
        assert!(err
            .to_string()
            .starts_with("job_id test_job did not complete successfully"));
    }

    #[test]
    fn test_timeout_message() {
        let err = HcaError::Timeout {
            job_id: "steve-was-here".into(),
            waited: Duration::from_secs(1),
        };
        assert!(err.to_string().contains("Exceeded max wait time"));
    }
}
