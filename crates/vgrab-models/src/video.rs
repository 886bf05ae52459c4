//! Video record model.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::utils::normalize_video_url;

/// Unique identifier for a tracked video asset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct VideoId(pub String);

impl VideoId {
    /// Generate a new random video ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for VideoId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for VideoId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for VideoId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Upload lifecycle status of a video asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum VideoStatus {
    /// Discovered but not yet archived
    #[default]
    Pending,
    /// Download/upload pipeline in progress
    Uploading,
    /// Archived in object storage
    Synced,
    /// Pipeline failed
    Error,
}

impl VideoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoStatus::Pending => "pending",
            VideoStatus::Uploading => "uploading",
            VideoStatus::Synced => "synced",
            VideoStatus::Error => "error",
        }
    }

    /// Parse from the snake_case wire form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(VideoStatus::Pending),
            "uploading" => Some(VideoStatus::Uploading),
            "synced" => Some(VideoStatus::Synced),
            "error" => Some(VideoStatus::Error),
            _ => None,
        }
    }
}

impl fmt::Display for VideoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One candidate source discovered for a video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VideoSource {
    /// Source URL
    pub url: String,
    /// Whether the source is an HLS playlist
    #[serde(default)]
    pub is_hls: bool,
    /// MIME type reported by the network layer, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// Record of one failed download attempt against a specific source.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FailedAttempt {
    /// Index into `video_sources` that was attempted
    pub source_index: usize,
    /// 1-based attempt counter at the time of failure
    pub attempt: u32,
    /// URL that was attempted
    pub url: String,
    /// Error message
    pub error: String,
    /// When the attempt failed
    pub timestamp: DateTime<Utc>,
}

/// Persistent record for a discovered media asset.
///
/// Invariants maintained by the video tracker:
/// - `status == Synced` implies `s3_url` and `synced_at` are set.
/// - `status == Uploading` implies `uploading_at` is set.
/// - `download_path` may reference a file that no longer exists; consumers
///   must treat a missing file as absent and re-download.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct VideoRecord {
    /// Unique record ID
    pub id: VideoId,

    /// Page the asset was discovered on
    pub source_url: String,

    /// Current best media URL
    pub video_url: String,

    /// All discovered sources, best first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub video_sources: Vec<VideoSource>,

    /// URL used for storage-key generation (stable across source retries)
    pub primary_video_url: String,

    /// Upload lifecycle status
    #[serde(default)]
    pub status: VideoStatus,

    /// Public storage URL once synced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3_url: Option<String>,

    /// Local path of a completed download, reusable by the next sync
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_path: Option<String>,

    /// Size in bytes of the downloaded file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_size: Option<u64>,

    /// Content type of the downloaded file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_content_type: Option<String>,

    /// When the local download completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloaded_at: Option<DateTime<Utc>>,

    /// When the record reached `Synced`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synced_at: Option<DateTime<Utc>>,

    /// When the current upload started (stuck detection)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploading_at: Option<DateTime<Utc>>,

    /// Last error message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Content classified as protected/undownloadable; not auto-retried
    #[serde(default)]
    pub is_protected: bool,

    /// Sync was satisfied by an existing object (HEAD dedup)
    #[serde(default)]
    pub skipped_upload: bool,

    /// Record created from an object already present in storage
    #[serde(default)]
    pub auto_imported: bool,

    /// Next sync must bypass the HEAD dedup check
    #[serde(default)]
    pub force_reupload: bool,

    /// Number of retry passes consumed
    #[serde(default)]
    pub retry_count: u32,

    /// History of failed source attempts
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_attempts: Vec<FailedAttempt>,

    /// Index of the source that produced the current download
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloaded_source_index: Option<usize>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl VideoRecord {
    /// Create a new pending record.
    pub fn new(source_url: impl Into<String>, video_url: impl Into<String>) -> Self {
        let video_url = video_url.into();
        Self {
            id: VideoId::new(),
            source_url: source_url.into(),
            primary_video_url: video_url.clone(),
            video_url,
            video_sources: Vec::new(),
            status: VideoStatus::Pending,
            s3_url: None,
            download_path: None,
            download_size: None,
            download_content_type: None,
            downloaded_at: None,
            synced_at: None,
            uploading_at: None,
            error: None,
            is_protected: false,
            skipped_upload: false,
            auto_imported: false,
            force_reupload: false,
            retry_count: 0,
            failed_attempts: Vec::new(),
            downloaded_source_index: None,
            created_at: Utc::now(),
        }
    }

    /// Normalized form of the current video URL (query and fragment stripped).
    pub fn normalized_url(&self) -> String {
        normalize_video_url(&self.video_url)
    }

    /// Mark as synced to the given storage URL.
    pub fn mark_synced(&mut self, s3_url: impl Into<String>) {
        self.status = VideoStatus::Synced;
        self.s3_url = Some(s3_url.into());
        self.synced_at = Some(Utc::now());
        self.uploading_at = None;
        self.error = None;
        self.force_reupload = false;
    }

    /// Mark as failed with the given error, clearing stale download pointers
    /// so the next attempt re-downloads.
    pub fn mark_error(&mut self, error: impl Into<String>) {
        self.status = VideoStatus::Error;
        self.error = Some(error.into());
        self.uploading_at = None;
        self.clear_download();
    }

    /// Drop the local download pointers.
    pub fn clear_download(&mut self) {
        self.download_path = None;
        self.download_size = None;
        self.download_content_type = None;
        self.downloaded_at = None;
        self.downloaded_source_index = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_id_generation() {
        let id1 = VideoId::new();
        let id2 = VideoId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_new_record_is_pending() {
        let rec = VideoRecord::new("https://page.example", "https://cdn.example/v.mp4?tok=1");
        assert_eq!(rec.status, VideoStatus::Pending);
        assert_eq!(rec.primary_video_url, "https://cdn.example/v.mp4?tok=1");
        assert_eq!(rec.normalized_url(), "https://cdn.example/v.mp4");
    }

    #[test]
    fn test_mark_synced_sets_invariant_fields() {
        let mut rec = VideoRecord::new("https://p", "https://v/clip.mp4");
        rec.status = VideoStatus::Uploading;
        rec.uploading_at = Some(Utc::now());
        rec.mark_synced("https://bucket/clip.mp4");
        assert_eq!(rec.status, VideoStatus::Synced);
        assert!(rec.s3_url.is_some());
        assert!(rec.synced_at.is_some());
        assert!(rec.uploading_at.is_none());
    }

    #[test]
    fn test_mark_error_clears_download_pointers() {
        let mut rec = VideoRecord::new("https://p", "https://v/clip.mp4");
        rec.download_path = Some("/tmp/clip.mp4".into());
        rec.download_size = Some(42);
        rec.mark_error("boom");
        assert_eq!(rec.status, VideoStatus::Error);
        assert!(rec.download_path.is_none());
        assert!(rec.download_size.is_none());
        assert!(rec.downloaded_at.is_none());
    }

    #[test]
    fn test_status_roundtrip() {
        for s in [
            VideoStatus::Pending,
            VideoStatus::Uploading,
            VideoStatus::Synced,
            VideoStatus::Error,
        ] {
            assert_eq!(VideoStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(VideoStatus::parse("bogus"), None);
    }
}
