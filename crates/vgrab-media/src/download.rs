//! Download facade with bounded external-tool concurrency.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, info};

use vgrab_models::{is_dash_url, is_hls_url};

use crate::config::DownloadConfig;
use crate::direct::download_direct;
use crate::error::{MediaError, MediaResult};
use crate::guard::TempFileGuard;
use crate::hls::download_stream;
use crate::probe::validate_video;
use crate::ssrf::validate_download_url;
use crate::watermark::apply_watermark_if_enabled;

/// How often the facade samples the growing file for progress events.
const PROGRESS_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Progress sample during a download.
#[derive(Debug, Clone, Copy)]
pub struct DownloadProgress {
    /// Bytes on disk so far
    pub bytes: u64,
    /// Seconds since the download started
    pub elapsed_secs: f64,
}

/// A finished, validated download. The guard owns the file.
#[derive(Debug)]
pub struct DownloadedFile {
    /// Temp-file owner; take with `into_path` or let it clean up
    pub guard: TempFileGuard,
    /// Size in bytes
    pub size: u64,
    /// Best-known content type
    pub content_type: String,
}

/// Strategy-selecting downloader.
///
/// External tool invocations are bounded by a semaphore independent of
/// the upload queue's concurrency, so a wide queue cannot fan out into
/// unbounded `yt-dlp` processes.
pub struct Downloader {
    config: DownloadConfig,
    semaphore: Arc<Semaphore>,
    scratch_dir: PathBuf,
}

impl Downloader {
    /// Create a downloader with its own scratch directory.
    pub fn new(config: DownloadConfig) -> MediaResult<Self> {
        let scratch_dir = std::env::temp_dir().join("vgrab-downloads");
        std::fs::create_dir_all(&scratch_dir)?;
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_downloads.max(1)));
        Ok(Self {
            config,
            semaphore,
            scratch_dir,
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> MediaResult<Self> {
        Self::new(DownloadConfig::from_env())
    }

    /// Effective configuration.
    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    fn scratch_path(&self) -> MediaResult<PathBuf> {
        let file = tempfile::Builder::new()
            .prefix("vgrab-")
            .suffix(".mp4")
            .tempfile_in(&self.scratch_dir)?;
        Ok(file.into_temp_path().keep().map_err(|e| e.error)?)
    }

    /// Download `url`, validate it, and apply the optional watermark.
    ///
    /// `is_hls` forces the segmented path; otherwise the URL extension
    /// decides. `on_progress` is sampled from the growing file, so it
    /// works for both the direct and the external-tool path.
    pub async fn download<F>(
        &self,
        url: &str,
        referer: Option<&str>,
        user_agent: Option<&str>,
        is_hls: bool,
        on_progress: F,
    ) -> MediaResult<DownloadedFile>
    where
        F: Fn(DownloadProgress) + Send + Sync + 'static,
    {
        // The guard applies to every strategy; yt-dlp must not be handed
        // an internal address either.
        validate_download_url(url)?;

        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| MediaError::download_failed("downloader is shutting down"))?;

        let path = self.scratch_path()?;
        let guard = TempFileGuard::new(&path);
        let segmented = is_hls || is_hls_url(url) || is_dash_url(url);

        debug!(url, segmented, path = %path.display(), "starting download");

        let poller = {
            let path = path.clone();
            let started = std::time::Instant::now();
            let cb = Arc::new(on_progress);
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(PROGRESS_POLL_INTERVAL);
                loop {
                    interval.tick().await;
                    if let Ok(meta) = tokio::fs::metadata(&path).await {
                        cb(DownloadProgress {
                            bytes: meta.len(),
                            elapsed_secs: started.elapsed().as_secs_f64(),
                        });
                    }
                }
            })
        };

        let result = if segmented {
            download_stream(url, &path, &self.config, referer, user_agent)
                .await
                .map(|size| (size, "video/mp4".to_string()))
        } else {
            download_direct(url, &path, &self.config, user_agent)
                .await
                .map(|d| {
                    let content_type = d.content_type.unwrap_or_else(|| "video/mp4".to_string());
                    (d.size, content_type)
                })
        };

        poller.abort();

        let (mut size, content_type) = result?;

        validate_video(&path).await?;

        if apply_watermark_if_enabled(&path, &self.config.watermark).await? {
            size = tokio::fs::metadata(&path).await?.len();
        }

        info!(url, size, %content_type, "download validated");
        Ok(DownloadedFile {
            guard,
            size,
            content_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_blocked_url_rejected_before_slot_acquired() {
        let downloader = Downloader::new(DownloadConfig::default()).unwrap();
        let err = downloader
            .download("http://169.254.169.254/x.mp4", None, None, false, |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::BlockedHost(_)));
        assert_eq!(
            downloader.semaphore.available_permits(),
            downloader.config.max_concurrent_downloads
        );
    }

    #[test]
    fn test_scratch_paths_are_unique() {
        let downloader = Downloader::new(DownloadConfig::default()).unwrap();
        let a = downloader.scratch_path().unwrap();
        let b = downloader.scratch_path().unwrap();
        assert_ne!(a, b);
        let _ = std::fs::remove_file(a);
        let _ = std::fs::remove_file(b);
    }
}
