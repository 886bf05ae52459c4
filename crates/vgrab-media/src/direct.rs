//! Direct HTTP(S) video download.

use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::config::DownloadConfig;
use crate::error::{MediaError, MediaResult};
use crate::ssrf::validate_download_url;

/// Maximum redirects followed by the direct downloader.
const MAX_REDIRECTS: usize = 10;

/// Outcome of a direct download.
#[derive(Debug, Clone)]
pub struct DirectDownload {
    /// Bytes written
    pub size: u64,
    /// Content type from the response, if any
    pub content_type: Option<String>,
}

/// Stream a video over HTTP(S) into `output_path`.
///
/// Enforces the scheme/host guard before connecting, the declared
/// `Content-Length` against the configured cap, and the actual byte count
/// while streaming (servers lie). The whole transfer runs under the
/// configured wall-clock timeout.
pub async fn download_direct(
    url: &str,
    output_path: impl AsRef<Path>,
    config: &DownloadConfig,
    user_agent: Option<&str>,
) -> MediaResult<DirectDownload> {
    let url = validate_download_url(url)?;
    let output_path = output_path.as_ref();

    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .connect_timeout(Duration::from_secs(30))
        .user_agent(user_agent.unwrap_or(&config.user_agent))
        .build()?;

    let transfer = async {
        let response = client.get(url.clone()).send().await?;

        if !response.status().is_success() {
            return Err(MediaError::download_failed(format!(
                "HTTP {} from {}",
                response.status(),
                url
            )));
        }

        if let Some(len) = response.content_length() {
            if len > config.max_size_bytes {
                return Err(MediaError::TooLarge {
                    actual: len,
                    limit: config.max_size_bytes,
                });
            }
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.split(';').next().unwrap_or(s).trim().to_string());

        let mut file = tokio::fs::File::create(output_path).await?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            written += chunk.len() as u64;
            if written > config.max_size_bytes {
                return Err(MediaError::TooLarge {
                    actual: written,
                    limit: config.max_size_bytes,
                });
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        debug!(url = %url, written, "direct download finished");
        Ok(DirectDownload {
            size: written,
            content_type,
        })
    };

    match tokio::time::timeout(config.timeout, transfer).await {
        Ok(Ok(result)) => {
            info!(
                path = %output_path.display(),
                size_mb = result.size as f64 / (1024.0 * 1024.0),
                "downloaded video"
            );
            Ok(result)
        }
        Ok(Err(e)) => {
            let _ = tokio::fs::remove_file(output_path).await;
            Err(e)
        }
        Err(_) => {
            let _ = tokio::fs::remove_file(output_path).await;
            Err(MediaError::Timeout(config.timeout.as_secs()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_blocked_host_fails_before_connecting() {
        let config = DownloadConfig::default();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("x.mp4");

        let err = download_direct("http://127.0.0.1/x.mp4", &out, &config, None)
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::BlockedHost(_)));
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn test_bad_scheme_rejected() {
        let config = DownloadConfig::default();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("x.mp4");

        let err = download_direct("ftp://example.com/x.mp4", &out, &config, None)
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::UnsupportedScheme(_)));
    }
}
