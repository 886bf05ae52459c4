//! Candidate media discovered during a page render.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One media response observed on the wire while rendering a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VideoCandidate {
    /// Response URL
    pub url: String,
    /// MIME type from the response headers, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Whether the URL or MIME marks this as an HLS playlist
    #[serde(default)]
    pub is_hls: bool,
    /// Declared content length, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_length: Option<u64>,
    /// Judged to be the page's main player source
    #[serde(default)]
    pub is_primary: bool,
}

impl VideoCandidate {
    /// Create a candidate from a bare URL.
    pub fn from_url(url: impl Into<String>) -> Self {
        let url = url.into();
        let is_hls = crate::utils::is_hls_url(&url);
        Self {
            url,
            mime_type: None,
            is_hls,
            content_length: None,
            is_primary: false,
        }
    }
}
