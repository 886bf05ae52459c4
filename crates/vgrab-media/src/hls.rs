//! Segmented stream download via yt-dlp, with ffmpeg fallback.

use std::path::Path;
use std::process::Stdio;

use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::config::{DownloadConfig, YtdlpDownloader};
use crate::error::{MediaError, MediaResult};

/// Download an HLS/DASH stream and assemble it into an MP4 container.
///
/// `yt-dlp` runs first with the configured fragment settings; on a
/// non-zero exit the partial output is deleted and `ffmpeg` retries with
/// reconnect options. The assembled file is then remuxed in a second,
/// directly-invoked ffmpeg step (no shell, no exec hook). Both children
/// are killed on the wall-clock timeout.
pub async fn download_stream(
    url: &str,
    output_path: impl AsRef<Path>,
    config: &DownloadConfig,
    referer: Option<&str>,
    user_agent: Option<&str>,
) -> MediaResult<u64> {
    let output_path = output_path.as_ref();
    let part_path = output_path.with_extension("part.mp4");

    let ytdlp_result = run_ytdlp(url, &part_path, config, referer, user_agent).await;

    if let Err(e) = ytdlp_result {
        warn!("yt-dlp failed ({}), falling back to ffmpeg", e);
        remove_partial(&part_path).await;
        run_ffmpeg_fetch(url, &part_path, config, user_agent).await.map_err(|fallback| {
            // Keep the more specific of the two failures.
            match &fallback {
                MediaError::Timeout(_) => fallback,
                _ => MediaError::download_failed(format!(
                    "yt-dlp failed: {}; ffmpeg fallback failed: {}",
                    e, fallback
                )),
            }
        })?;
    }

    if !part_path.exists() {
        return Err(MediaError::download_failed("stream download produced no file"));
    }

    remux(&part_path, output_path, config).await?;
    remove_partial(&part_path).await;

    let size = output_path.metadata()?.len();
    info!(
        path = %output_path.display(),
        size_mb = size as f64 / (1024.0 * 1024.0),
        "assembled stream download"
    );
    Ok(size)
}

async fn remove_partial(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            debug!(path = %path.display(), "failed to remove partial file: {}", e);
        }
    }
}

fn ytdlp_args(
    url: &str,
    output: &Path,
    config: &DownloadConfig,
    referer: Option<&str>,
    user_agent: Option<&str>,
) -> Vec<String> {
    let ytdlp = &config.ytdlp;
    let mut args: Vec<String> = vec![
        "--no-playlist".into(),
        "--no-progress".into(),
        "-f".into(),
        "bv*+ba/b".into(),
        "--merge-output-format".into(),
        "mp4".into(),
        "-N".into(),
        ytdlp.concurrent_fragments.to_string(),
        "--retries".into(),
        ytdlp.retries.to_string(),
        "--fragment-retries".into(),
        ytdlp.fragment_retries.to_string(),
        "--socket-timeout".into(),
        ytdlp.socket_timeout.to_string(),
    ];

    match ytdlp.downloader {
        YtdlpDownloader::Aria2c => {
            args.push("--downloader".into());
            args.push("aria2c".into());
            args.push("--downloader-args".into());
            args.push(format!("aria2c:-x {}", ytdlp.aria2c_connections));
        }
        YtdlpDownloader::Ffmpeg => {
            args.push("--downloader".into());
            args.push("ffmpeg".into());
        }
        YtdlpDownloader::Native => {}
    }

    if let Some(referer) = referer {
        args.push("--referer".into());
        args.push(referer.to_string());
    }
    args.push("--user-agent".into());
    args.push(user_agent.unwrap_or(&config.user_agent).to_string());

    args.push("-o".into());
    args.push(output.to_string_lossy().to_string());
    args.push(url.to_string());
    args
}

async fn run_ytdlp(
    url: &str,
    output: &Path,
    config: &DownloadConfig,
    referer: Option<&str>,
    user_agent: Option<&str>,
) -> MediaResult<()> {
    which::which("yt-dlp").map_err(|_| MediaError::YtDlpNotFound)?;

    let args = ytdlp_args(url, output, config, referer, user_agent);
    debug!("running yt-dlp {}", args.join(" "));

    let child = Command::new("yt-dlp")
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let output_result = wait_with_timeout(child, config.timeout.as_secs()).await?;
    if !output_result.status.success() {
        let stderr = String::from_utf8_lossy(&output_result.stderr);
        return Err(MediaError::download_failed(format!(
            "yt-dlp exited with {}: {}",
            output_result.status,
            stderr.lines().last().unwrap_or("unknown error")
        )));
    }
    Ok(())
}

async fn run_ffmpeg_fetch(
    url: &str,
    output: &Path,
    config: &DownloadConfig,
    user_agent: Option<&str>,
) -> MediaResult<()> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

    let ua_header = format!("User-Agent: {}\r\n", user_agent.unwrap_or(&config.user_agent));
    let args: Vec<String> = vec![
        "-y".into(),
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-reconnect".into(),
        "1".into(),
        "-reconnect_streamed".into(),
        "1".into(),
        "-reconnect_delay_max".into(),
        "5".into(),
        "-protocol_whitelist".into(),
        "file,http,https,tcp,tls,crypto".into(),
        "-headers".into(),
        ua_header,
        "-i".into(),
        url.to_string(),
        "-c".into(),
        "copy".into(),
        "-bsf:a".into(),
        "aac_adtstoasc".into(),
        output.to_string_lossy().to_string(),
    ];
    debug!("running ffmpeg fetch for {}", url);

    let child = Command::new("ffmpeg")
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let output_result = wait_with_timeout(child, config.timeout.as_secs()).await?;
    if !output_result.status.success() {
        let stderr = String::from_utf8_lossy(&output_result.stderr);
        return Err(MediaError::ffmpeg_failed(
            "stream fetch failed",
            Some(stderr.into_owned()),
            output_result.status.code(),
        ));
    }
    Ok(())
}

/// Remux the assembled part file into the final container with a direct
/// `ffmpeg -c copy` step.
async fn remux(input: &Path, output: &Path, config: &DownloadConfig) -> MediaResult<()> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

    let args: Vec<String> = vec![
        "-y".into(),
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-i".into(),
        input.to_string_lossy().to_string(),
        "-c".into(),
        "copy".into(),
        "-movflags".into(),
        "+faststart".into(),
        output.to_string_lossy().to_string(),
    ];

    let child = Command::new("ffmpeg")
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let result = wait_with_timeout(child, config.timeout.as_secs()).await?;
    if !result.status.success() {
        let stderr = String::from_utf8_lossy(&result.stderr);
        return Err(MediaError::ffmpeg_failed(
            "remux failed",
            Some(stderr.into_owned()),
            result.status.code(),
        ));
    }
    Ok(())
}

/// Wait for a child with a wall-clock timeout, killing it on expiry.
async fn wait_with_timeout(
    child: Child,
    timeout_secs: u64,
) -> MediaResult<std::process::Output> {
    match tokio::time::timeout(
        std::time::Duration::from_secs(timeout_secs),
        child.wait_with_output(),
    )
    .await
    {
        Ok(output) => Ok(output?),
        Err(_) => {
            // kill_on_drop reaps the child when the timed-out future drops.
            warn!("external tool timed out after {}s", timeout_secs);
            Err(MediaError::Timeout(timeout_secs))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ytdlp_args_native() {
        let config = DownloadConfig::default();
        let args = ytdlp_args(
            "https://s/master.m3u8",
            Path::new("/tmp/out.part.mp4"),
            &config,
            Some("https://page"),
            None,
        );
        assert!(args.contains(&"-N".to_string()));
        assert!(args.contains(&"--referer".to_string()));
        assert!(!args.contains(&"--downloader".to_string()));
        assert_eq!(args.last().unwrap(), "https://s/master.m3u8");
    }

    #[test]
    fn test_ytdlp_args_aria2c() {
        let mut config = DownloadConfig::default();
        config.ytdlp.downloader = YtdlpDownloader::Aria2c;
        config.ytdlp.aria2c_connections = 8;
        let args = ytdlp_args(
            "https://s/master.m3u8",
            Path::new("/tmp/out.part.mp4"),
            &config,
            None,
            None,
        );
        assert!(args.contains(&"aria2c".to_string()));
        assert!(args.contains(&"aria2c:-x 8".to_string()));
    }

    #[test]
    fn test_url_is_a_single_argument() {
        // Argument-vector spawning: a hostile URL stays one argv entry.
        let config = DownloadConfig::default();
        let url = "https://s/x.m3u8?a=1;rm -rf /";
        let args = ytdlp_args(url, Path::new("/tmp/o.mp4"), &config, None, None);
        assert_eq!(args.iter().filter(|a| a.contains("rm -rf")).count(), 1);
        assert_eq!(args.last().unwrap(), url);
    }
}
