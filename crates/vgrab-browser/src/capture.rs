//! Network-event capture for candidate media discovery.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use chromiumoxide::cdp::browser_protocol::network::{EventResponseReceived, ResourceType};
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::debug;

use vgrab_models::{is_hls_url, VideoCandidate};

use crate::error::BrowserResult;

/// Media container extensions recognized in response URLs.
const MEDIA_EXTENSIONS: &[&str] = &[
    ".mp4", ".webm", ".mov", ".avi", ".mkv", ".m4v", ".m3u8", ".m3u", ".mpd",
];

/// MIME types that mark a response as media.
fn is_media_mime(mime: &str) -> bool {
    let mime = mime.to_ascii_lowercase();
    mime.starts_with("video/")
        || mime == "application/vnd.apple.mpegurl"
        || mime == "application/x-mpegurl"
        || mime == "application/dash+xml"
}

fn has_media_extension(url: &str) -> bool {
    let path = url
        .split(['?', '#'])
        .next()
        .unwrap_or(url)
        .to_ascii_lowercase();
    MEDIA_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

/// Everything observed during one render.
#[derive(Debug, Clone, Default)]
pub struct CaptureResult {
    /// Candidate media responses, in first-seen order
    pub candidates: Vec<VideoCandidate>,
    /// XHR/fetch request count
    pub api_calls: u32,
}

/// Listener collecting media responses from a page's network events.
pub struct NetworkCapture {
    candidates: Arc<Mutex<Vec<VideoCandidate>>>,
    api_calls: Arc<AtomicU32>,
    task: JoinHandle<()>,
}

impl NetworkCapture {
    /// Attach to a page. Must run before navigation so early responses
    /// are not missed.
    pub async fn attach(page: &Page) -> BrowserResult<Self> {
        let mut events = page.event_listener::<EventResponseReceived>().await?;

        let candidates: Arc<Mutex<Vec<VideoCandidate>>> = Arc::new(Mutex::new(Vec::new()));
        let api_calls = Arc::new(AtomicU32::new(0));

        let task = {
            let candidates = Arc::clone(&candidates);
            let api_calls = Arc::clone(&api_calls);
            tokio::spawn(async move {
                while let Some(event) = events.next().await {
                    record_response(&event, &candidates, &api_calls);
                }
            })
        };

        Ok(Self {
            candidates,
            api_calls,
            task,
        })
    }

    /// Stop listening and return what was seen.
    pub fn finish(self) -> CaptureResult {
        self.task.abort();
        let candidates = self
            .candidates
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default();
        CaptureResult {
            candidates,
            api_calls: self.api_calls.load(Ordering::Relaxed),
        }
    }
}

fn record_response(
    event: &EventResponseReceived,
    candidates: &Mutex<Vec<VideoCandidate>>,
    api_calls: &AtomicU32,
) {
    if matches!(event.r#type, ResourceType::Xhr | ResourceType::Fetch) {
        api_calls.fetch_add(1, Ordering::Relaxed);
    }

    let url = event.response.url.clone();
    if url.starts_with("data:") {
        return;
    }

    let mime = event.response.mime_type.clone();
    let from_media_element = event.r#type == ResourceType::Media;
    let looks_like_media =
        from_media_element || is_media_mime(&mime) || has_media_extension(&url);
    if !looks_like_media {
        return;
    }

    let content_length = event
        .response
        .headers
        .inner()
        .as_object()
        .and_then(|h| {
            h.get("content-length")
                .or_else(|| h.get("Content-Length"))
        })
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse::<u64>().ok());

    let candidate = VideoCandidate {
        is_hls: is_hls_url(&url)
            || mime.eq_ignore_ascii_case("application/vnd.apple.mpegurl")
            || mime.eq_ignore_ascii_case("application/x-mpegurl"),
        mime_type: if mime.is_empty() { None } else { Some(mime) },
        content_length,
        is_primary: from_media_element,
        url,
    };

    debug!(url = %candidate.url, primary = candidate.is_primary, "captured media response");
    if let Ok(mut list) = candidates.lock() {
        list.push(candidate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_mime_detection() {
        assert!(is_media_mime("video/mp4"));
        assert!(is_media_mime("application/vnd.apple.mpegURL"));
        assert!(is_media_mime("application/dash+xml"));
        assert!(!is_media_mime("text/html"));
        assert!(!is_media_mime("image/png"));
    }

    #[test]
    fn test_media_extension_detection() {
        assert!(has_media_extension("https://s/v/clip.mp4?sig=1"));
        assert!(has_media_extension("https://s/v/master.M3U8"));
        assert!(has_media_extension("https://s/v/manifest.mpd"));
        assert!(!has_media_extension("https://s/v/page.html"));
    }
}
