//! Feed error types.

use thiserror::Error;

use emploi_store::StoreError;

pub type FeedResult<T> = Result<T, FeedError>;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl FeedError {
    pub fn invalid_cursor(msg: impl Into<String>) -> Self {
        Self::InvalidCursor(msg.into())
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            FeedError::Store(e) => e.is_transient(),
            FeedError::InvalidCursor(_) => false,
        }
    }
}
