//! Queue error types.

use thiserror::Error;

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Errors that can occur in the upload queue.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Item not found in queue: {0}")]
    NotFound(String),

    #[error("Invalid queue operation: {0}")]
    InvalidOperation(String),

    #[error("Tracker error: {0}")]
    Tracker(#[from] vgrab_tracker::TrackerError),
}

impl QueueError {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound(id.into())
    }

    pub fn invalid_operation(msg: impl Into<String>) -> Self {
        Self::InvalidOperation(msg.into())
    }
}
