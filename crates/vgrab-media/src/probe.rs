//! ffprobe-based download validation.

use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::error::{MediaError, MediaResult};

/// Minimum accepted frame dimension.
const MIN_DIMENSION: u32 = 10;

/// Codecs that indicate a still image served as "video".
const IMAGE_CODECS: &[&str] = &["png", "mjpeg", "jpeg", "gif", "bmp", "webp"];

/// Video file information.
#[derive(Debug, Clone)]
pub struct VideoInfo {
    /// Duration in seconds
    pub duration: f64,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Video codec
    pub codec: String,
    /// File size in bytes
    pub size: u64,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

/// Probe a file for stream information.
pub async fn probe_video(path: impl AsRef<Path>) -> MediaResult<VideoInfo> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::download_failed(format!(
            "file not found: {}",
            path.display()
        )));
    }

    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::not_a_valid_video(format!(
            "ffprobe failed: {}",
            String::from_utf8_lossy(&output.stderr)
        )));
    }

    let probe: FfprobeOutput = serde_json::from_slice(&output.stdout)?;

    let video_stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| MediaError::not_a_valid_video("no video stream found"))?;

    let duration = probe
        .format
        .duration
        .as_ref()
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    let size = probe
        .format
        .size
        .as_ref()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);

    Ok(VideoInfo {
        duration,
        width: video_stream.width.unwrap_or(0),
        height: video_stream.height.unwrap_or(0),
        codec: video_stream.codec_name.clone().unwrap_or_default(),
        size,
    })
}

/// Confirm a downloaded file is a real video.
///
/// Rejects files with no video stream, tiny dimensions, or an image codec
/// masquerading as video. Used as the gate between download and upload.
pub async fn validate_video(path: impl AsRef<Path>) -> MediaResult<VideoInfo> {
    let info = probe_video(path).await?;
    check_stream(&info)?;
    Ok(info)
}

fn check_stream(info: &VideoInfo) -> MediaResult<()> {
    if info.width < MIN_DIMENSION || info.height < MIN_DIMENSION {
        return Err(MediaError::not_a_valid_video(format!(
            "video dimensions too small: {}x{}",
            info.width, info.height
        )));
    }
    let codec = info.codec.to_ascii_lowercase();
    if IMAGE_CODECS.contains(&codec.as_str()) {
        return Err(MediaError::not_a_valid_video(format!(
            "image codec {} is not a video",
            info.codec
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(width: u32, height: u32, codec: &str) -> VideoInfo {
        VideoInfo {
            duration: 10.0,
            width,
            height,
            codec: codec.to_string(),
            size: 1024,
        }
    }

    #[test]
    fn test_accepts_real_video() {
        assert!(check_stream(&info(1920, 1080, "h264")).is_ok());
        assert!(check_stream(&info(640, 360, "vp9")).is_ok());
    }

    #[test]
    fn test_rejects_tiny_dimensions() {
        let err = check_stream(&info(1, 1, "h264")).unwrap_err();
        assert!(err.to_string().contains("not a valid video"));
    }

    #[test]
    fn test_rejects_image_codecs() {
        for codec in ["png", "mjpeg", "jpeg", "gif", "bmp", "webp", "PNG"] {
            let err = check_stream(&info(800, 600, codec)).unwrap_err();
            assert!(err.to_string().contains("not a valid video"), "codec {codec}");
        }
    }
}
