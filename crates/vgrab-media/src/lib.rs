//! Media download and processing.
//!
//! The downloader picks a strategy per source (direct HTTP vs segmented
//! HLS/DASH through `yt-dlp`/`ffmpeg`), validates the result with
//! `ffprobe`, optionally applies a watermark, and hands ownership of the
//! temp file to the caller through an RAII guard.

mod config;
mod direct;
mod download;
mod error;
mod guard;
mod hls;
mod probe;
mod ssrf;
mod watermark;

pub use config::{DownloadConfig, WatermarkConfig, YtdlpConfig, YtdlpDownloader};
pub use direct::{download_direct, DirectDownload};
pub use download::{DownloadProgress, DownloadedFile, Downloader};
pub use error::{MediaError, MediaResult};
pub use guard::TempFileGuard;
pub use hls::download_stream;
pub use probe::{probe_video, validate_video, VideoInfo};
pub use ssrf::validate_download_url;
pub use watermark::apply_watermark_if_enabled;
