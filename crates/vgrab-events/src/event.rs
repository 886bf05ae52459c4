//! Event types published on the bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Category of a bus event.
///
/// Progress variants are high-rate and excluded from the replay buffer;
/// everything else is buffered for new subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Log,
    DownloadStart,
    DownloadProgress,
    DownloadComplete,
    DownloadError,
    UploadQueued,
    UploadStart,
    UploadProgress,
    UploadComplete,
    UploadError,
    UploadPaused,
    UploadResumed,
    UploadCancelled,
    QueueState,
}

impl EventKind {
    /// High-rate events that are dropped first under back-pressure and
    /// never replayed.
    pub fn is_progress(&self) -> bool {
        matches!(self, EventKind::DownloadProgress | EventKind::UploadProgress)
    }
}

/// One event on the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Event category
    pub kind: EventKind,
    /// Severity (log events only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<LogLevel>,
    /// Human-readable message
    pub message: String,
    /// Related video ID, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
    /// Structured payload (progress numbers, queue snapshot, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// When the event was published
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Create an event with the current timestamp.
    pub fn new(kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            level: None,
            message: message.into(),
            video_id: None,
            data: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a log event.
    pub fn log(level: LogLevel, message: impl Into<String>) -> Self {
        let mut event = Self::new(EventKind::Log, message);
        event.level = Some(level);
        event
    }

    /// Attach a video ID.
    pub fn with_video(mut self, video_id: impl Into<String>) -> Self {
        self.video_id = Some(video_id.into());
        self
    }

    /// Attach a structured payload.
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}
