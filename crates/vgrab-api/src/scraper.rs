//! Scrape orchestration: cache, tracker, render, select, record.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use vgrab_browser::{select_best, RenderArtifact, RenderOptions};
use vgrab_models::{ScrapeSummary, UrlRecord, VideoSource};
use vgrab_queue::AddOptions;
use vgrab_store::ScrapeFingerprint;
use vgrab_tracker::extract_title;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Characters of body kept on the URL record for diagnostics.
const PREVIEW_LEN: usize = 500;

/// Validated scrape request, ready to run.
#[derive(Debug, Clone, Default)]
pub struct ScrapeRequest {
    pub url: String,
    pub custom_user_agent: Option<String>,
    pub cookies: Vec<(String, String)>,
    pub user_pass: Option<(String, String)>,
    pub timeout: Option<Duration>,
    pub proxy_url: Option<String>,
    pub proxy_auth: Option<String>,
    pub cleanup: bool,
    pub delay: Option<Duration>,
    pub localstorage: Vec<(String, String)>,
    pub eval: Option<String>,
}

impl ScrapeRequest {
    /// Cache identity of this request.
    pub fn fingerprint(&self) -> ScrapeFingerprint {
        ScrapeFingerprint {
            url: self.url.clone(),
            custom_user_agent: self.custom_user_agent.clone(),
            custom_cookies: if self.cookies.is_empty() {
                None
            } else {
                Some(
                    self.cookies
                        .iter()
                        .map(|(k, v)| format!("{}={}", k, v))
                        .collect::<Vec<_>>()
                        .join(";"),
                )
            },
            user_pass: self
                .user_pass
                .as_ref()
                .map(|(user, pass)| format!("{}:{}", user, pass)),
            timeout: self.timeout.map(|t| t.as_millis() as u64),
            proxy_url: self.proxy_url.clone(),
            proxy_auth: self.proxy_auth.clone(),
        }
    }

    fn render_options(&self) -> RenderOptions {
        RenderOptions {
            url: self.url.clone(),
            user_agent: self.custom_user_agent.clone(),
            cookies: self.cookies.clone(),
            basic_auth: self.user_pass.clone(),
            timeout: self.timeout,
            proxy_url: self.proxy_url.clone(),
            proxy_auth: self.proxy_auth.clone(),
            delay: self.delay,
            localstorage: self.localstorage.clone(),
            eval: self.eval.clone(),
            cleanup: self.cleanup,
        }
    }
}

/// Outcome of one scrape, including cache provenance.
#[derive(Debug, Clone)]
pub struct ScrapeOutcome {
    pub artifact: RenderArtifact,
    pub cached: bool,
    pub selected_video: Option<String>,
    pub record: UrlRecord,
}

/// Run a scrape request end to end.
///
/// The cache enforces single-flight per fingerprint; the URL tracker
/// records the request lifecycle either way; discovered candidates are
/// selected and recorded on the video tracker.
pub async fn run_scrape(state: &AppState, request: &ScrapeRequest) -> ApiResult<ScrapeOutcome> {
    let fingerprint = request.fingerprint();
    let record = state.url_tracker.create(&request.url).await?;
    let record = state.url_tracker.mark_processing(&record.id).await?;

    let renderer = Arc::clone(&state.renderer);
    let options = request.render_options();
    let rendered = state
        .cache
        .get_or_render(&fingerprint, move || async move {
            renderer.render(&options).await
        })
        .await;

    let (artifact, cached) = match rendered {
        Ok(result) => result,
        Err(e) => {
            let message = e.to_string();
            if let Err(track_err) = state.url_tracker.fail(&record.id, &message).await {
                warn!(id = %record.id, "failed to record error: {}", track_err);
            }
            return Err(map_render_error(e, &message));
        }
    };

    let selected = select_best(&artifact.candidates);
    let selected_video = selected.as_ref().map(|c| c.url.clone());

    if let Some(best) = &selected {
        let sources: Vec<VideoSource> = artifact
            .candidates
            .iter()
            .map(|c| VideoSource {
                url: c.url.clone(),
                is_hls: c.is_hls,
                mime_type: c.mime_type.clone(),
            })
            .collect();
        match state
            .video_tracker
            .add_video(&request.url, &best.url, sources)
            .await
        {
            Ok((video, created)) => {
                if created && state.config.auto_sync_videos {
                    state.queue.add(video.id.clone(), AddOptions::default());
                }
            }
            Err(e) => warn!("failed to record video: {}", e),
        }
    }

    let summary = ScrapeSummary {
        html_length: artifact.html.len(),
        html_preview: artifact.html.chars().take(PREVIEW_LEN).collect(),
        title: artifact
            .title
            .clone()
            .or_else(|| extract_title(&artifact.html)),
        video_urls: artifact.candidates.iter().map(|c| c.url.clone()).collect(),
        cached,
    };
    let record = state
        .url_tracker
        .complete(&record.id, summary, Some(fingerprint.cache_key()))
        .await?;

    info!(
        url = %request.url,
        cached,
        video = selected_video.as_deref().unwrap_or("-"),
        "scrape complete"
    );

    Ok(ScrapeOutcome {
        artifact,
        cached,
        selected_video,
        record,
    })
}

fn map_render_error(e: vgrab_store::StoreError, message: &str) -> ApiError {
    // Timeouts surface as 504 regardless of which layer reported them.
    if message.contains("timed out") {
        ApiError::Timeout(message.to_string())
    } else {
        match e {
            vgrab_store::StoreError::RenderFailed(msg) => ApiError::Upstream(msg),
            other => ApiError::Store(other),
        }
    }
}

/// Re-run a scrape for an existing record: the old record is destroyed
/// and a fresh one goes through the normal path.
pub async fn rescrape(state: &AppState, record_id: &str) -> ApiResult<ScrapeOutcome> {
    let old = state.url_tracker.get(record_id).await?;

    // Drop the cached artifact so the render actually re-runs.
    let fingerprint = ScrapeFingerprint::for_url(&old.url);
    state.cache.delete(&fingerprint).await;
    state.url_tracker.delete(record_id).await?;

    let request = ScrapeRequest {
        url: old.url,
        ..Default::default()
    };
    run_scrape(state, &request).await
}
