//! Download configuration.

use std::time::Duration;

/// Default user agent sent by the direct downloader.
const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

/// External downloader used by yt-dlp for segment fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum YtdlpDownloader {
    /// yt-dlp's built-in fetcher
    #[default]
    Native,
    /// aria2c with parallel connections
    Aria2c,
    /// ffmpeg protocol fetcher
    Ffmpeg,
}

impl YtdlpDownloader {
    fn parse(s: &str) -> Self {
        match s {
            "aria2c" => YtdlpDownloader::Aria2c,
            "ffmpeg" => YtdlpDownloader::Ffmpeg,
            _ => YtdlpDownloader::Native,
        }
    }
}

/// yt-dlp invocation settings.
#[derive(Debug, Clone)]
pub struct YtdlpConfig {
    /// `-N` fragment concurrency
    pub concurrent_fragments: u32,
    /// External downloader selection
    pub downloader: YtdlpDownloader,
    /// `-x` connection count when aria2c is used
    pub aria2c_connections: u32,
    /// Whole-download retries
    pub retries: u32,
    /// Per-fragment retries
    pub fragment_retries: u32,
    /// Socket timeout in seconds
    pub socket_timeout: u32,
}

impl Default for YtdlpConfig {
    fn default() -> Self {
        Self {
            concurrent_fragments: 4,
            downloader: YtdlpDownloader::Native,
            aria2c_connections: 4,
            retries: 3,
            fragment_retries: 5,
            socket_timeout: 30,
        }
    }
}

impl YtdlpConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            concurrent_fragments: env_parse("YTDLP_CONCURRENT_FRAGMENTS", defaults.concurrent_fragments),
            downloader: std::env::var("YTDLP_DOWNLOADER")
                .map(|v| YtdlpDownloader::parse(&v))
                .unwrap_or(defaults.downloader),
            aria2c_connections: env_parse("YTDLP_ARIA2C_CONNECTIONS", defaults.aria2c_connections),
            retries: env_parse("YTDLP_RETRIES", defaults.retries),
            fragment_retries: env_parse("YTDLP_FRAGMENT_RETRIES", defaults.fragment_retries),
            socket_timeout: env_parse("YTDLP_SOCKET_TIMEOUT", defaults.socket_timeout),
        }
    }
}

/// Watermark overlay settings.
#[derive(Debug, Clone)]
pub struct WatermarkConfig {
    /// Whether the overlay is applied at all
    pub enabled: bool,
    /// Text drawn over the video
    pub text: String,
    /// Font size in points
    pub fontsize: u32,
    /// Text opacity (0.0 to 1.0)
    pub opacity: f32,
    /// Position keyword: top-left, top-right, bottom-left, bottom-right, center
    pub position: String,
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            text: String::new(),
            fontsize: 24,
            opacity: 0.5,
            position: "bottom-right".to_string(),
        }
    }
}

impl WatermarkConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            enabled: std::env::var("WATERMARK_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            text: std::env::var("WATERMARK_TEXT").unwrap_or_default(),
            fontsize: env_parse("WATERMARK_FONTSIZE", defaults.fontsize),
            opacity: std::env::var("WATERMARK_OPACITY")
                .ok()
                .and_then(|s| s.parse::<f32>().ok())
                .map(|o| o.clamp(0.0, 1.0))
                .unwrap_or(defaults.opacity),
            position: std::env::var("WATERMARK_POSITION").unwrap_or(defaults.position),
        }
    }
}

/// Downloader settings.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Hard cap on downloaded bytes
    pub max_size_bytes: u64,
    /// Wall-clock timeout per download
    pub timeout: Duration,
    /// Parallel external downloads (semaphore width)
    pub max_concurrent_downloads: usize,
    /// User agent for direct fetches; overridable per call
    pub user_agent: String,
    /// yt-dlp settings
    pub ytdlp: YtdlpConfig,
    /// Watermark settings
    pub watermark: WatermarkConfig,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: 500 * 1024 * 1024,
            timeout: Duration::from_secs(300),
            max_concurrent_downloads: 2,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            ytdlp: YtdlpConfig::default(),
            watermark: WatermarkConfig::default(),
        }
    }
}

impl DownloadConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let max_size_mb: u64 = env_parse("UPLOAD_MAX_SIZE_MB", 500);
        let timeout_secs: u64 = env_parse("UPLOAD_TIMEOUT", defaults.timeout.as_secs());
        let concurrency = std::env::var("UPLOAD_MAX_CONCURRENT_DOWNLOADS")
            .or_else(|_| std::env::var("MAX_CONCURRENT_DOWNLOADS"))
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.max_concurrent_downloads);

        Self {
            max_size_bytes: max_size_mb * 1024 * 1024,
            timeout: Duration::from_secs(timeout_secs),
            max_concurrent_downloads: concurrency,
            user_agent: defaults.user_agent,
            ytdlp: YtdlpConfig::from_env(),
            watermark: WatermarkConfig::from_env(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DownloadConfig::default();
        assert_eq!(config.max_size_bytes, 500 * 1024 * 1024);
        assert_eq!(config.timeout, Duration::from_secs(300));
        assert_eq!(config.max_concurrent_downloads, 2);
    }

    #[test]
    fn test_downloader_parse() {
        assert_eq!(YtdlpDownloader::parse("aria2c"), YtdlpDownloader::Aria2c);
        assert_eq!(YtdlpDownloader::parse("ffmpeg"), YtdlpDownloader::Ffmpeg);
        assert_eq!(YtdlpDownloader::parse("native"), YtdlpDownloader::Native);
        assert_eq!(YtdlpDownloader::parse("junk"), YtdlpDownloader::Native);
    }
}
