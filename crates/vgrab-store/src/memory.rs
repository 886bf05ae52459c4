//! In-process fallback store.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

/// Simple glob match supporting `*` wildcards, as used by Redis patterns.
pub(crate) fn glob_match(pattern: &str, key: &str) -> bool {
    fn inner(p: &[u8], k: &[u8]) -> bool {
        match (p.first(), k.first()) {
            (None, None) => true,
            (Some(b'*'), _) => {
                inner(&p[1..], k) || (!k.is_empty() && inner(p, &k[1..]))
            }
            (Some(pc), Some(kc)) if pc == kc => inner(&p[1..], &k[1..]),
            _ => false,
        }
    }
    inner(pattern.as_bytes(), key.as_bytes())
}

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }
}

struct MemoryInner {
    strings: HashMap<String, Entry>,
    hashes: HashMap<String, HashMap<String, String>>,
}

/// Mutex-guarded map store with lazy TTL expiry.
///
/// Always available; used standalone or as the fallback behind Redis.
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MemoryInner {
                strings: HashMap::new(),
                hashes: HashMap::new(),
            }),
        }
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        match inner.strings.get(key) {
            Some(entry) if entry.is_expired(now) => {
                inner.strings.remove(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    pub async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) {
        let mut inner = self.inner.lock().await;
        inner.strings.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: ttl.map(|d| Instant::now() + d),
            },
        );
    }

    pub async fn del(&self, key: &str) -> bool {
        let mut inner = self.inner.lock().await;
        inner.strings.remove(key).is_some()
    }

    pub async fn hget(&self, hash: &str, field: &str) -> Option<String> {
        let inner = self.inner.lock().await;
        inner.hashes.get(hash).and_then(|h| h.get(field).cloned())
    }

    pub async fn hset(&self, hash: &str, field: &str, value: &str) {
        let mut inner = self.inner.lock().await;
        inner
            .hashes
            .entry(hash.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
    }

    pub async fn hdel(&self, hash: &str, field: &str) -> bool {
        let mut inner = self.inner.lock().await;
        inner
            .hashes
            .get_mut(hash)
            .map(|h| h.remove(field).is_some())
            .unwrap_or(false)
    }

    pub async fn hgetall(&self, hash: &str) -> HashMap<String, String> {
        let inner = self.inner.lock().await;
        inner.hashes.get(hash).cloned().unwrap_or_default()
    }

    pub async fn keys(&self, pattern: &str) -> Vec<String> {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        inner.strings.retain(|_, entry| !entry.is_expired(now));
        inner
            .strings
            .keys()
            .filter(|k| glob_match(pattern, k))
            .cloned()
            .collect()
    }

    pub async fn clear(&self, pattern: &str) -> usize {
        let mut inner = self.inner.lock().await;
        let to_remove: Vec<String> = inner
            .strings
            .keys()
            .filter(|k| glob_match(pattern, k))
            .cloned()
            .collect();
        for key in &to_remove {
            inner.strings.remove(key);
        }
        to_remove.len()
    }

    /// Drop every expired string entry. Called by the periodic sweep.
    pub async fn sweep_expired(&self) -> usize {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        let before = inner.strings.len();
        inner.strings.retain(|_, entry| !entry.is_expired(now));
        before - inner.strings.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match() {
        assert!(glob_match("cache:*", "cache:abc"));
        assert!(glob_match("*", "anything"));
        assert!(glob_match("a*c", "abc"));
        assert!(glob_match("a*c", "ac"));
        assert!(!glob_match("cache:*", "other:abc"));
        assert!(!glob_match("a*c", "abd"));
    }

    #[tokio::test]
    async fn test_set_get_del() {
        let store = MemoryStore::new();
        store.set("k", "v", None).await;
        assert_eq!(store.get("k").await.as_deref(), Some("v"));
        assert!(store.del("k").await);
        assert_eq!(store.get("k").await, None);
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let store = MemoryStore::new();
        store.set("k", "v", Some(Duration::from_millis(0))).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(store.get("k").await, None);
    }

    #[tokio::test]
    async fn test_hash_operations() {
        let store = MemoryStore::new();
        store.hset("videos", "id1", "{}").await;
        store.hset("videos", "id2", "{\"a\":1}").await;
        assert_eq!(store.hget("videos", "id1").await.as_deref(), Some("{}"));
        assert_eq!(store.hgetall("videos").await.len(), 2);
        assert!(store.hdel("videos", "id1").await);
        assert_eq!(store.hgetall("videos").await.len(), 1);
    }

    #[tokio::test]
    async fn test_clear_pattern() {
        let store = MemoryStore::new();
        store.set("cache:a", "1", None).await;
        store.set("cache:b", "2", None).await;
        store.set("other", "3", None).await;
        assert_eq!(store.clear("cache:*").await, 2);
        assert_eq!(store.get("other").await.as_deref(), Some("3"));
    }
}
