//! Upload queue item projection.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::video::VideoId;

/// Per-item state inside the upload queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum QueueItemState {
    /// Waiting for admission
    Pending,
    /// Worker running
    Active,
    /// Excluded from admission until resumed
    Paused,
    /// Finished successfully
    Completed,
    /// Finished with an error
    Failed,
    /// Cancelled by the operator
    Cancelled,
}

impl QueueItemState {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueItemState::Pending => "pending",
            QueueItemState::Active => "active",
            QueueItemState::Paused => "paused",
            QueueItemState::Completed => "completed",
            QueueItemState::Failed => "failed",
            QueueItemState::Cancelled => "cancelled",
        }
    }

    /// Whether the item has left the live queue.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            QueueItemState::Completed | QueueItemState::Failed | QueueItemState::Cancelled
        )
    }
}

impl fmt::Display for QueueItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Transient projection of one queued upload, keyed by video ID.
///
/// The video tracker owns the authoritative state; the queue keeps only
/// what the admission loop and the status endpoint need.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct QueueItem {
    /// Video being uploaded
    pub video_id: VideoId,
    /// Admission priority (higher first)
    pub priority: i32,
    /// Item state
    pub state: QueueItemState,
    /// When the item was enqueued
    pub added_at: DateTime<Utc>,
    /// When the worker picked it up
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the item reached a terminal state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Progress in percent (0-100)
    #[serde(default)]
    pub progress: f64,
    /// Transfer speed in bytes/second
    #[serde(default)]
    pub speed: f64,
    /// Estimated seconds remaining
    #[serde(default)]
    pub eta: f64,
    /// Error for failed items
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Display label (page URL or title) for the admin UI
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Display URL for the admin UI
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_url: Option<String>,
}

impl QueueItem {
    /// Create a fresh pending item.
    pub fn new(video_id: VideoId, priority: i32) -> Self {
        Self {
            video_id,
            priority,
            state: QueueItemState::Pending,
            added_at: Utc::now(),
            started_at: None,
            completed_at: None,
            progress: 0.0,
            speed: 0.0,
            eta: 0.0,
            error: None,
            display_name: None,
            display_url: None,
        }
    }
}

/// One page of queue status, split by liveness.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct QueueStatusPage {
    /// Live items (pending/active/paused), admission order
    pub items: Vec<QueueItem>,
    /// Terminal items, most recent first
    pub history: Vec<QueueItem>,
    /// Total live items before pagination
    pub total: usize,
    /// Total history items before pagination
    pub history_total: usize,
    /// Whether global admission is paused
    pub is_paused: bool,
    /// Currently active item count
    pub active: usize,
}
