//! API error envelope.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

/// Errors surfaced by the HTTP layer as `{error, code}` envelopes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Timeout(String),

    #[error("Upstream failure: {0}")]
    Upstream(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Storage error: {0}")]
    Storage(#[from] vgrab_storage::StorageError),

    #[error("Tracker error: {0}")]
    Tracker(vgrab_tracker::TrackerError),

    #[error("Queue error: {0}")]
    Queue(vgrab_queue::QueueError),

    #[error("Browser error: {0}")]
    Browser(vgrab_browser::BrowserError),

    #[error("Store error: {0}")]
    Store(#[from] vgrab_store::StoreError),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Storage(vgrab_storage::StorageError::NotConfigured(_)) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Storage(vgrab_storage::StorageError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Tracker(vgrab_tracker::TrackerError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Tracker(vgrab_tracker::TrackerError::InvalidState(_)) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Queue(vgrab_queue::QueueError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Queue(vgrab_queue::QueueError::InvalidOperation(_)) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Browser(vgrab_browser::BrowserError::Timeout(_)) => {
                StatusCode::GATEWAY_TIMEOUT
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<vgrab_tracker::TrackerError> for ApiError {
    fn from(e: vgrab_tracker::TrackerError) -> Self {
        match e {
            vgrab_tracker::TrackerError::Storage(inner) => Self::Storage(inner),
            other => Self::Tracker(other),
        }
    }
}

impl From<vgrab_queue::QueueError> for ApiError {
    fn from(e: vgrab_queue::QueueError) -> Self {
        match e {
            vgrab_queue::QueueError::Tracker(inner) => inner.into(),
            other => Self::Queue(other),
        }
    }
}

impl From<vgrab_browser::BrowserError> for ApiError {
    fn from(e: vgrab_browser::BrowserError) -> Self {
        match e {
            vgrab_browser::BrowserError::Timeout(ms) => {
                Self::Timeout(format!("render timed out after {} ms", ms))
            }
            other => Self::Browser(other),
        }
    }
}

#[derive(Serialize)]
struct ErrorEnvelope {
    error: String,
    code: u16,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Internal details stay out of production responses.
        let message = match &self {
            ApiError::Internal(_) | ApiError::Store(_) => {
                if std::env::var("ENVIRONMENT").unwrap_or_default() == "production" {
                    "An internal error occurred".to_string()
                } else {
                    self.to_string()
                }
            }
            _ => self.to_string(),
        };

        let body = ErrorEnvelope {
            error: message,
            code: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::bad_request("x").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::not_found("x").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::Timeout("x".into()).status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            ApiError::from(vgrab_browser::BrowserError::Timeout(1000)).status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }
}
