//! Text watermark overlay.

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{info, warn};

use crate::config::WatermarkConfig;
use crate::error::{MediaError, MediaResult};

/// Escape a string for use inside a drawtext filter value.
fn escape_drawtext(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('\'', "\\'")
        .replace(':', "\\:")
        .replace('%', "\\%")
}

/// drawtext x/y expressions for a position keyword.
fn position_expr(position: &str) -> (&'static str, &'static str) {
    match position {
        "top-left" => ("10", "10"),
        "top-right" => ("w-tw-10", "10"),
        "bottom-left" => ("10", "h-th-10"),
        "center" => ("(w-tw)/2", "(h-th)/2"),
        _ => ("w-tw-10", "h-th-10"), // bottom-right
    }
}

/// Build the drawtext filter for the configured overlay.
fn build_drawtext_filter(config: &WatermarkConfig) -> String {
    let (x, y) = position_expr(&config.position);
    format!(
        "drawtext=text='{}':fontsize={}:fontcolor=white@{:.2}:x={}:y={}:shadowcolor=black@0.4:shadowx=1:shadowy=1",
        escape_drawtext(&config.text),
        config.fontsize,
        config.opacity,
        x,
        y
    )
}

/// Re-encode `video_path` in place with the text overlay.
///
/// Fails soft: any error leaves the original file untouched and returns
/// `Ok(false)`, since a missing watermark is preferable to a failed
/// archive.
pub async fn apply_watermark_if_enabled(
    video_path: &Path,
    config: &WatermarkConfig,
) -> MediaResult<bool> {
    if !config.enabled || config.text.is_empty() {
        return Ok(false);
    }

    match apply_watermark(video_path, config).await {
        Ok(()) => Ok(true),
        Err(e) => {
            warn!(
                video = %video_path.display(),
                "watermark failed, keeping original: {}", e
            );
            Ok(false)
        }
    }
}

async fn apply_watermark(video_path: &Path, config: &WatermarkConfig) -> MediaResult<()> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

    let temp_output = video_path.with_extension("watermarked.mp4");
    let filter = build_drawtext_filter(config);

    let output = Command::new("ffmpeg")
        .args([
            "-y",
            "-hide_banner",
            "-loglevel",
            "warning",
            "-i",
        ])
        .arg(video_path)
        .args(["-vf", &filter, "-c:v", "libx264", "-preset", "veryfast", "-crf", "23", "-c:a", "copy", "-movflags", "+faststart"])
        .arg(&temp_output)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        let _ = tokio::fs::remove_file(&temp_output).await;
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(MediaError::ffmpeg_failed(
            "watermark overlay failed",
            Some(stderr.into_owned()),
            output.status.code(),
        ));
    }

    tokio::fs::rename(&temp_output, video_path).await?;
    info!(video = %video_path.display(), "watermark applied");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_contains_settings() {
        let config = WatermarkConfig {
            enabled: true,
            text: "vgrab".to_string(),
            fontsize: 32,
            opacity: 0.5,
            position: "bottom-right".to_string(),
        };
        let filter = build_drawtext_filter(&config);
        assert!(filter.contains("text='vgrab'"));
        assert!(filter.contains("fontsize=32"));
        assert!(filter.contains("white@0.50"));
        assert!(filter.contains("x=w-tw-10"));
    }

    #[test]
    fn test_escape_drawtext() {
        assert_eq!(escape_drawtext("a:b"), "a\\:b");
        assert_eq!(escape_drawtext("it's"), "it\\'s");
        assert_eq!(escape_drawtext("100%"), "100\\%");
    }

    #[test]
    fn test_position_expressions() {
        assert_eq!(position_expr("top-left"), ("10", "10"));
        assert_eq!(position_expr("center"), ("(w-tw)/2", "(h-th)/2"));
        assert_eq!(position_expr("anything"), ("w-tw-10", "h-th-10"));
    }

    #[tokio::test]
    async fn test_disabled_watermark_is_noop() {
        let config = WatermarkConfig::default();
        let applied = apply_watermark_if_enabled(Path::new("/nonexistent.mp4"), &config)
            .await
            .unwrap();
        assert!(!applied);
    }
}
