//! Notification error types.

use thiserror::Error;

pub type NotifyResult<T> = Result<T, NotifyError>;

#[derive(Debug, Error)]
pub enum NotifyError {
    /// Provider overloaded or failing; the whole batch may be retried
    #[error("Transient provider failure ({status}): {message}")]
    Transient { status: u16, message: String },

    /// Provider refused the batch; retrying will not help
    #[error("Batch rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Batcher closed")]
    Closed,

    #[error("Sink error: {0}")]
    Sink(String),
}

impl NotifyError {
    /// Map a non-success provider status: 429 and 5xx are transient,
    /// other 4xx are permanent.
    pub fn from_http_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            429 | 500..=599 => Self::Transient { status, message },
            _ => Self::Rejected { status, message },
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            NotifyError::Transient { .. } | NotifyError::Sink(_) => true,
            NotifyError::Network(e) => !e.is_builder(),
            NotifyError::Rejected { .. } | NotifyError::Json(_) | NotifyError::Closed => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(NotifyError::from_http_status(429, "slow down").is_retryable());
        assert!(NotifyError::from_http_status(503, "unavailable").is_retryable());
        assert!(!NotifyError::from_http_status(400, "bad payload").is_retryable());
        assert!(!NotifyError::from_http_status(401, "bad key").is_retryable());
        assert!(matches!(
            NotifyError::from_http_status(404, "x"),
            NotifyError::Rejected { status: 404, .. }
        ));
    }
}
