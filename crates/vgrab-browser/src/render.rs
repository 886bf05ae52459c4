//! Page rendering with candidate capture.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use chromiumoxide::cdp::browser_protocol::network::{CookieParam, Headers, SetExtraHttpHeadersParams};
use chromiumoxide::Page;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use vgrab_models::VideoCandidate;

use crate::capture::NetworkCapture;
use crate::error::{BrowserError, BrowserResult};
use crate::launch::launch_browser;
use crate::pool::BrowserPool;

/// Options for one render.
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    /// Target URL
    pub url: String,
    /// Override the browser's user agent
    pub user_agent: Option<String>,
    /// Cookies as name/value pairs, set for the target URL
    pub cookies: Vec<(String, String)>,
    /// HTTP basic auth credentials
    pub basic_auth: Option<(String, String)>,
    /// Per-request deadline; the pool config default applies when unset
    pub timeout: Option<Duration>,
    /// Proxy server URL; forces a dedicated browser
    pub proxy_url: Option<String>,
    /// `user:pass` for the proxy
    pub proxy_auth: Option<String>,
    /// Extra settle delay after navigation
    pub delay: Option<Duration>,
    /// localStorage entries applied after navigation
    pub localstorage: Vec<(String, String)>,
    /// JavaScript snippet evaluated after navigation
    pub eval: Option<String>,
    /// Destroy the page after the render instead of recycling it
    pub cleanup: bool,
}

/// Result of a successful render.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderArtifact {
    /// Rendered document HTML
    pub html: String,
    /// Document title, when present
    pub title: Option<String>,
    /// Candidate media seen on the wire
    pub candidates: Vec<VideoCandidate>,
    /// XHR/fetch count during the render
    pub api_calls: u32,
}

/// Renders pages on pooled (or, with a proxy, dedicated) browsers.
pub struct Renderer {
    pool: Arc<BrowserPool>,
}

impl Renderer {
    pub fn new(pool: Arc<BrowserPool>) -> Self {
        Self { pool }
    }

    /// The pool backing this renderer.
    pub fn pool(&self) -> &Arc<BrowserPool> {
        &self.pool
    }

    /// Render a page, enforcing the per-request deadline.
    pub async fn render(&self, options: &RenderOptions) -> BrowserResult<RenderArtifact> {
        let timeout = options.timeout.unwrap_or(self.pool.config().timeout);
        if options.proxy_url.is_some() {
            self.render_with_dedicated_browser(options, timeout).await
        } else {
            self.render_with_pool(options, timeout).await
        }
    }

    async fn render_with_pool(
        &self,
        options: &RenderOptions,
        timeout: Duration,
    ) -> BrowserResult<RenderArtifact> {
        let lease = self.pool.acquire_page().await?;
        let page = lease.page.clone();

        match tokio::time::timeout(timeout, drive_page(&page, options)).await {
            Ok(Ok(artifact)) => {
                if options.cleanup {
                    self.pool.destroy_page(lease).await;
                } else {
                    self.pool.release_page(lease).await;
                }
                Ok(artifact)
            }
            Ok(Err(e)) => {
                self.pool.destroy_page(lease).await;
                Err(e)
            }
            Err(_) => {
                self.pool.destroy_page(lease).await;
                Err(BrowserError::Timeout(timeout.as_millis() as u64))
            }
        }
    }

    /// A per-request proxy cannot be applied to a shared browser, so
    /// proxied renders get a short-lived dedicated instance.
    async fn render_with_dedicated_browser(
        &self,
        options: &RenderOptions,
        timeout: Duration,
    ) -> BrowserResult<RenderArtifact> {
        let proxy = options.proxy_url.as_deref().unwrap_or_default();
        let extra_args = vec![format!("--proxy-server={}", proxy)];
        let (mut browser, handler) = launch_browser(self.pool.config(), &extra_args).await?;
        debug!(proxy, "launched dedicated proxied browser");

        let result = async {
            let page = browser
                .new_page("about:blank")
                .await
                .map_err(|e| BrowserError::page_failed(e.to_string()))?;
            tokio::time::timeout(timeout, drive_page(&page, options))
                .await
                .map_err(|_| BrowserError::Timeout(timeout.as_millis() as u64))?
        }
        .await;

        if let Err(e) = browser.close().await {
            debug!("dedicated browser close failed ({}), killing", e);
            let _ = browser.kill().await;
        }
        let _ = browser.wait().await;
        handler.abort();

        result
    }
}

/// Drive a prepared page through the full render sequence.
async fn drive_page(page: &Page, options: &RenderOptions) -> BrowserResult<RenderArtifact> {
    if let Some(ua) = &options.user_agent {
        page.set_user_agent(ua.as_str()).await?;
    }

    let mut headers = serde_json::Map::new();
    if let Some((user, pass)) = &options.basic_auth {
        let encoded = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", user, pass));
        headers.insert(
            "Authorization".to_string(),
            serde_json::Value::String(format!("Basic {}", encoded)),
        );
    }
    if let Some(auth) = &options.proxy_auth {
        let encoded = base64::engine::general_purpose::STANDARD.encode(auth);
        headers.insert(
            "Proxy-Authorization".to_string(),
            serde_json::Value::String(format!("Basic {}", encoded)),
        );
    }
    if !headers.is_empty() {
        page.execute(SetExtraHttpHeadersParams::new(Headers::new(
            serde_json::Value::Object(headers),
        )))
        .await?;
    }

    if !options.cookies.is_empty() {
        let cookies: Vec<CookieParam> = options
            .cookies
            .iter()
            .filter_map(|(name, value)| {
                CookieParam::builder()
                    .name(name.clone())
                    .value(value.clone())
                    .url(options.url.clone())
                    .build()
                    .ok()
            })
            .collect();
        page.set_cookies(cookies).await?;
    }

    // Capture must be attached before navigation starts.
    let capture = NetworkCapture::attach(page).await?;

    page.goto(options.url.as_str()).await?;
    let _ = page.wait_for_navigation().await;

    if !options.localstorage.is_empty() {
        let mut script = String::new();
        for (key, value) in &options.localstorage {
            script.push_str(&format!(
                "localStorage.setItem({}, {});",
                serde_json::Value::String(key.clone()),
                serde_json::Value::String(value.clone()),
            ));
        }
        page.evaluate(script).await?;
    }

    if let Some(snippet) = &options.eval {
        page.evaluate(snippet.as_str()).await?;
    }

    if let Some(delay) = options.delay {
        tokio::time::sleep(delay).await;
    }

    let html = page
        .content()
        .await
        .map_err(|e| BrowserError::page_failed(e.to_string()))?;
    let title = page.get_title().await.ok().flatten();

    let captured = capture.finish();
    info!(
        url = %options.url,
        candidates = captured.candidates.len(),
        api_calls = captured.api_calls,
        "render complete"
    );

    Ok(RenderArtifact {
        html,
        title,
        candidates: captured.candidates,
        api_calls: captured.api_calls,
    })
}
