//! Scrape request fingerprinting.

use serde::Serialize;

/// Canonical identity of one scrape request.
///
/// Two requests with the same fingerprint are interchangeable for caching:
/// the serialized form uses a fixed field order, so equal option sets
/// always produce equal cache keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScrapeFingerprint {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_cookies: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_pass: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy_auth: Option<String>,
}

impl ScrapeFingerprint {
    /// Fingerprint with only a URL.
    pub fn for_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Canonical cache key: JSON with struct-ordered (alphabetical) keys.
    pub fn cache_key(&self) -> String {
        // Field order in the struct is alphabetical after `url`; serde_json
        // preserves declaration order, giving a stable canonical form.
        serde_json::to_string(self).expect("fingerprint serialization cannot fail")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_options_equal_keys() {
        let a = ScrapeFingerprint {
            url: "https://example.com".into(),
            timeout: Some(30_000),
            ..Default::default()
        };
        let b = a.clone();
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn test_differing_options_differ() {
        let a = ScrapeFingerprint::for_url("https://example.com");
        let mut b = a.clone();
        b.custom_user_agent = Some("bot/1.0".into());
        assert_ne!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn test_unset_options_are_omitted() {
        let a = ScrapeFingerprint::for_url("https://example.com");
        assert_eq!(a.cache_key(), r#"{"url":"https://example.com"}"#);
    }
}
