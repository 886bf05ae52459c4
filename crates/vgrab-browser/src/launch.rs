//! Chromium discovery and launch.

use std::path::PathBuf;
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfigBuilder, HeadlessMode};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::config::BrowserConfig;
use crate::error::{BrowserError, BrowserResult};

/// Well-known Chromium install locations, probed in order.
const LINUX_PATHS: &[&str] = &[
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
    "/usr/local/bin/chromium",
    "/opt/google/chrome/chrome",
];

const MACOS_PATHS: &[&str] = &[
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    "/opt/homebrew/bin/chromium",
];

/// Find a Chromium executable: explicit config first, then well-known
/// paths, then `which`.
pub fn find_browser_executable(config: &BrowserConfig) -> BrowserResult<PathBuf> {
    if let Some(path) = &config.executable_path {
        let path = PathBuf::from(path);
        if path.exists() {
            return Ok(path);
        }
        warn!(
            "configured browser executable does not exist: {}",
            path.display()
        );
    }

    let paths: &[&str] = if cfg!(target_os = "macos") {
        MACOS_PATHS
    } else {
        LINUX_PATHS
    };

    for candidate in paths {
        let path = PathBuf::from(candidate);
        if path.exists() {
            debug!("found browser at {}", path.display());
            return Ok(path);
        }
    }

    for name in ["chromium", "chromium-browser", "google-chrome", "chrome"] {
        if let Ok(output) = std::process::Command::new("which").arg(name).output() {
            if output.status.success() {
                let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !path.is_empty() {
                    debug!("found browser via which: {}", path);
                    return Ok(PathBuf::from(path));
                }
            }
        }
    }

    Err(BrowserError::ExecutableNotFound)
}

/// Launch one browser process and spawn its CDP handler task.
///
/// `extra_args` are appended after the configured arguments (used for
/// per-render proxy settings). The returned handler task completes when
/// the browser disconnects.
pub async fn launch_browser(
    config: &BrowserConfig,
    extra_args: &[String],
) -> BrowserResult<(Browser, JoinHandle<()>)> {
    let executable = find_browser_executable(config)?;

    let mut builder = BrowserConfigBuilder::default()
        .chrome_executable(executable)
        .request_timeout(Duration::from_secs(30))
        .window_size(config.viewport_width, config.viewport_height);

    if config.headless {
        builder = builder.headless_mode(HeadlessMode::default());
    } else {
        builder = builder.with_head();
    }

    builder = builder
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--disable-background-networking")
        .arg("--disable-breakpad")
        .arg("--disable-hang-monitor")
        .arg("--disable-notifications")
        .arg("--hide-scrollbars")
        .arg("--mute-audio")
        .arg(format!(
            "--force-device-scale-factor={}",
            config.device_scale_factor
        ));

    for arg in config.args.iter().chain(extra_args) {
        builder = builder.arg(arg.clone());
    }

    let browser_config = builder
        .build()
        .map_err(BrowserError::launch_failed)?;

    let (browser, mut handler) = Browser::launch(browser_config)
        .await
        .map_err(|e| BrowserError::launch_failed(e.to_string()))?;

    let dumpio = config.dumpio;
    let handler_task = tokio::task::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                let msg = e.to_string();
                // Unknown CDP events deserialize to errors in
                // chromiumoxide; they are not fatal.
                let benign = msg.contains("data did not match any variant")
                    || msg.contains("Failed to deserialize WS response");
                if benign {
                    trace!("suppressed CDP serialization error: {}", msg);
                } else if dumpio {
                    warn!("browser handler error: {}", msg);
                } else {
                    debug!("browser handler error: {}", msg);
                }
            }
        }
        info!("browser handler finished");
    });

    Ok((browser, handler_task))
}
