//! Scrape request record model.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle status of a scrape request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum UrlStatus {
    /// Accepted, not yet started
    #[default]
    Waiting,
    /// Render in progress
    Processing,
    /// Render finished
    Done,
    /// Cancelled before completion
    Cancelled,
    /// Render failed
    Error,
}

impl UrlStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UrlStatus::Waiting => "waiting",
            UrlStatus::Processing => "processing",
            UrlStatus::Done => "done",
            UrlStatus::Cancelled => "cancelled",
            UrlStatus::Error => "error",
        }
    }

    /// Parse from the snake_case wire form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "waiting" => Some(UrlStatus::Waiting),
            "processing" => Some(UrlStatus::Processing),
            "done" => Some(UrlStatus::Done),
            "cancelled" => Some(UrlStatus::Cancelled),
            "error" => Some(UrlStatus::Error),
            _ => None,
        }
    }

    /// Whether the status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, UrlStatus::Done | UrlStatus::Cancelled | UrlStatus::Error)
    }
}

impl fmt::Display for UrlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Summary of a completed render attached to a URL record.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ScrapeSummary {
    /// Length of the rendered HTML in bytes
    pub html_length: usize,
    /// First bytes of the body, for diagnostics
    pub html_preview: String,
    /// Title extracted from the HTML head
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Candidate video URLs found during the render
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub video_urls: Vec<String>,
    /// Whether the response was served from the scrape cache
    #[serde(default)]
    pub cached: bool,
}

/// Persistent record for one scrape request.
///
/// Invariants maintained by the URL tracker:
/// - `completed_at` is set iff `status` is terminal.
/// - `started_at` is set iff the record has ever been `Processing`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct UrlRecord {
    /// Unique record ID
    pub id: String,
    /// Requested URL
    pub url: String,
    /// Lifecycle status
    #[serde(default)]
    pub status: UrlStatus,
    /// When the request arrived
    pub created_at: DateTime<Utc>,
    /// When rendering began
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When a terminal status was reached
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Error message for `Error` records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Fingerprint of the cached artifact, when one exists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_key: Option<String>,
    /// Render result summary
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ScrapeSummary>,
}

impl UrlRecord {
    /// Create a new waiting record for the given URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            url: url.into(),
            status: UrlStatus::Waiting,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
            cache_key: None,
            result: None,
        }
    }
}

/// Sort key for URL listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UrlSortKey {
    #[default]
    CreatedAt,
    CompletedAt,
    Url,
    Status,
}

/// Filter/sort/pagination parameters for URL listings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UrlQuery {
    /// Restrict to a single status
    pub status: Option<UrlStatus>,
    /// Substring match over the URL
    pub search: Option<String>,
    /// Lower creation-date bound
    pub from: Option<DateTime<Utc>>,
    /// Upper creation-date bound
    pub to: Option<DateTime<Utc>>,
    /// Sort key
    #[serde(default)]
    pub sort: UrlSortKey,
    /// Descending sort order
    #[serde(default)]
    pub desc: bool,
    /// Zero-based page offset
    #[serde(default)]
    pub offset: usize,
    /// Page size (0 means everything)
    #[serde(default)]
    pub limit: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_is_waiting() {
        let rec = UrlRecord::new("https://example.com");
        assert_eq!(rec.status, UrlStatus::Waiting);
        assert!(rec.started_at.is_none());
        assert!(rec.completed_at.is_none());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!UrlStatus::Waiting.is_terminal());
        assert!(!UrlStatus::Processing.is_terminal());
        assert!(UrlStatus::Done.is_terminal());
        assert!(UrlStatus::Cancelled.is_terminal());
        assert!(UrlStatus::Error.is_terminal());
    }
}
