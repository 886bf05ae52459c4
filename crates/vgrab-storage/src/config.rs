//! Storage configuration.

/// Configuration for the S3-compatible store.
#[derive(Debug, Clone, Default)]
pub struct StorageConfig {
    /// S3 API endpoint URL
    pub endpoint: String,
    /// Bucket name
    pub bucket: String,
    /// Region (often "auto" or "us-east-1" on compatible stores)
    pub region: String,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Prefix applied to every generated object key
    pub key_prefix: String,
    /// Optional CDN base URL for public links
    pub cdn_url: Option<String>,
    /// Use path-style addressing (endpoint/bucket/key) instead of
    /// virtual-hosted style
    pub path_style: bool,
}

impl StorageConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            endpoint: std::env::var("S3_ENDPOINT").unwrap_or_default(),
            bucket: std::env::var("S3_BUCKET").unwrap_or_default(),
            region: std::env::var("S3_REGION").unwrap_or_else(|_| "auto".to_string()),
            access_key_id: std::env::var("S3_ACCESS_KEY_ID").unwrap_or_default(),
            secret_access_key: std::env::var("S3_SECRET_ACCESS_KEY").unwrap_or_default(),
            key_prefix: std::env::var("S3_KEY_PREFIX").unwrap_or_default(),
            cdn_url: std::env::var("S3_CDN_URL").ok().filter(|s| !s.is_empty()),
            path_style: std::env::var("S3_PATH_STYLE")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(true),
        }
    }

    /// Whether all required settings are present.
    pub fn is_configured(&self) -> bool {
        !self.endpoint.is_empty()
            && !self.bucket.is_empty()
            && !self.access_key_id.is_empty()
            && !self.secret_access_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_unconfigured() {
        assert!(!StorageConfig::default().is_configured());
    }

    #[test]
    fn test_full_config_is_configured() {
        let config = StorageConfig {
            endpoint: "https://s3.example".into(),
            bucket: "media".into(),
            access_key_id: "id".into(),
            secret_access_key: "secret".into(),
            ..Default::default()
        };
        assert!(config.is_configured());
    }
}
