//! Tracker error types.

use thiserror::Error;

/// Result type for tracker operations.
pub type TrackerResult<T> = Result<T, TrackerError>;

/// Errors that can occur in the tracker layer.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Sync already in progress for {0}")]
    SyncInProgress(String),

    #[error("Scan already in progress")]
    ScanInProgress,

    #[error("Store error: {0}")]
    Store(#[from] vgrab_store::StoreError),

    #[error("Storage error: {0}")]
    Storage(#[from] vgrab_storage::StorageError),

    #[error("Media error: {0}")]
    Media(#[from] vgrab_media::MediaError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TrackerError {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound(id.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }
}
