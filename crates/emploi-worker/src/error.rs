//! Worker error types.

use thiserror::Error;

use emploi_feed::DetectorError;
use emploi_notify::NotifyError;
use emploi_queue::QueueError;
use emploi_store::StoreError;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Invalid job: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("Permanent failure: {0}")]
    Permanent(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Notification error: {0}")]
    Notify(#[from] NotifyError),

    #[error("Detector error: {0}")]
    Detector(#[from] DetectorError),
}

impl WorkerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::Permanent(msg.into())
    }

    /// Whether the dispatcher should schedule another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::Transient(_) => true,
            WorkerError::Store(e) => e.is_transient(),
            WorkerError::Queue(e) => e.is_retryable(),
            WorkerError::Notify(e) => e.is_retryable(),
            WorkerError::Detector(e) => matches!(e, DetectorError::Unavailable(_)),
            WorkerError::Validation(_) | WorkerError::NotFound(_) | WorkerError::Permanent(_) => {
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(WorkerError::transient("timeout").is_retryable());
        assert!(WorkerError::from(StoreError::Unavailable("down".into())).is_retryable());
        assert!(WorkerError::from(NotifyError::from_http_status(503, "busy")).is_retryable());

        assert!(!WorkerError::validation("bad").is_retryable());
        assert!(!WorkerError::from(StoreError::not_found("publication 7")).is_retryable());
        assert!(!WorkerError::from(NotifyError::from_http_status(400, "bad")).is_retryable());
        assert!(!WorkerError::permanent("gone").is_retryable());
    }
}
