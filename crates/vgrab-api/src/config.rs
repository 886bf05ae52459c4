//! Gateway configuration.

use std::time::Duration;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Bind address
    pub host: String,
    /// Bind port
    pub port: u16,
    /// Key expected in the scrape API's `apikey` parameter
    pub api_key: String,
    /// Scrape cache entry TTL
    pub cache_ttl: Duration,
    /// Enqueue newly discovered videos automatically
    pub auto_sync_videos: bool,
    /// Environment name (development/production)
    pub environment: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            api_key: "test-api-key".to_string(),
            cache_ttl: Duration::from_secs(3600),
            auto_sync_videos: false,
            environment: "development".to_string(),
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: std::env::var("PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            api_key: std::env::var("API_KEY").unwrap_or(defaults.api_key),
            cache_ttl: Duration::from_secs(
                std::env::var("CACHE_TTL")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.cache_ttl.as_secs()),
            ),
            auto_sync_videos: std::env::var("AUTO_SYNC_VIDEOS")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            environment: std::env::var("ENVIRONMENT").unwrap_or(defaults.environment),
        }
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ApiConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 3000);
        assert_eq!(config.api_key, "test-api-key");
        assert_eq!(config.cache_ttl, Duration::from_secs(3600));
        assert!(!config.is_production());
    }
}
