//! Browser configuration.

use std::time::Duration;

use tracing::warn;

/// Browser pool and launch configuration.
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// Engine family; only chromium-based browsers are supported
    pub browser_type: String,
    /// Explicit Chromium executable path; discovered when unset
    pub executable_path: Option<String>,
    /// Extra launch arguments
    pub args: Vec<String>,
    /// Viewport width
    pub viewport_width: u32,
    /// Viewport height
    pub viewport_height: u32,
    /// Device scale factor
    pub device_scale_factor: f64,
    /// Default per-render timeout
    pub timeout: Duration,
    /// Navigation wait condition (load | domcontentloaded | networkidle)
    pub wait_until: String,
    /// Run headless
    pub headless: bool,
    /// Pipe browser stdio into the gateway's logs
    pub dumpio: bool,
    /// Maximum live browsers
    pub max_concurrency: usize,
    /// Pages served before a browser is rotated out
    pub max_pages_per_browser: u32,
    /// Browser age before rotation
    pub browser_ttl: Duration,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            browser_type: "chromium".to_string(),
            executable_path: None,
            args: Vec::new(),
            viewport_width: 1920,
            viewport_height: 1080,
            device_scale_factor: 1.0,
            timeout: Duration::from_secs(30),
            wait_until: "load".to_string(),
            headless: true,
            dumpio: false,
            max_concurrency: 2,
            max_pages_per_browser: 30,
            browser_ttl: Duration::from_secs(30 * 60),
        }
    }
}

impl BrowserConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let args = match std::env::var("BROWSER_ARGS") {
            Ok(raw) if !raw.is_empty() => match serde_json::from_str::<Vec<String>>(&raw) {
                Ok(args) => args,
                Err(e) => {
                    warn!("BROWSER_ARGS is not a JSON array ({}), ignoring", e);
                    Vec::new()
                }
            },
            _ => Vec::new(),
        };

        let browser_type = std::env::var("BROWSER_TYPE").unwrap_or(defaults.browser_type);
        if !matches!(browser_type.as_str(), "chromium" | "chrome") {
            warn!("BROWSER_TYPE {} is not supported, using chromium", browser_type);
        }

        Self {
            browser_type,
            executable_path: std::env::var("BROWSER_EXECUTABLE_PATH")
                .ok()
                .filter(|s| !s.is_empty()),
            args,
            viewport_width: env_parse("BROWSER_VIEWPORT_WIDTH", defaults.viewport_width),
            viewport_height: env_parse("BROWSER_VIEWPORT_HEIGHT", defaults.viewport_height),
            device_scale_factor: env_parse(
                "BROWSER_VIEWPORT_DEVICE_SCALE_FACTOR",
                defaults.device_scale_factor,
            ),
            timeout: Duration::from_millis(env_parse(
                "BROWSER_TIMEOUT",
                defaults.timeout.as_millis() as u64,
            )),
            wait_until: std::env::var("BROWSER_WAIT_UNTIL").unwrap_or(defaults.wait_until),
            headless: std::env::var("BROWSER_HEADLESS")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
            dumpio: std::env::var("BROWSER_DUMPIO")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            max_concurrency: env_parse("BROWSER_MAX_CONCURRENCY", defaults.max_concurrency),
            max_pages_per_browser: env_parse(
                "BROWSER_MAX_PAGES_PER_BROWSER",
                defaults.max_pages_per_browser,
            ),
            browser_ttl: Duration::from_secs(env_parse(
                "BROWSER_TTL",
                defaults.browser_ttl.as_secs(),
            )),
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
        let config = BrowserConfig::default();
        assert_eq!(config.max_concurrency, 2);
        assert_eq!(config.max_pages_per_browser, 30);
        assert_eq!(config.browser_ttl, Duration::from_secs(1800));
        assert!(config.headless);
    }
}
