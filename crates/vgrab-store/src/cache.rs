//! Fingerprinted scrape cache with single-flight rendering.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::fingerprint::ScrapeFingerprint;
use crate::store::StateStore;

/// Key prefix for cache entries in the state store.
const CACHE_KEY_PREFIX: &str = "cache:";

/// Default entry TTL: one hour.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Cache hit/miss counters and entry count.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub in_flight: usize,
    pub ttl_secs: u64,
}

type FlightSender<T> = broadcast::Sender<Result<T, String>>;

/// Request-fingerprinted artifact cache.
///
/// Guarantees at-most-one concurrent render per fingerprint: concurrent
/// misses on the same key block on the first producer; a failed render is
/// delivered to every waiter and nothing is stored. Partial payloads are
/// never written (the producer returns a complete artifact or an error).
pub struct ScrapeCache<T> {
    store: Arc<StateStore>,
    ttl: Duration,
    in_flight: Mutex<HashMap<String, FlightSender<T>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<T> ScrapeCache<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + 'static,
{
    /// Create a cache over the given store.
    pub fn new(store: Arc<StateStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            in_flight: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn store_key(key: &str) -> String {
        format!("{}{}", CACHE_KEY_PREFIX, key)
    }

    /// Look up a cached artifact without rendering.
    pub async fn get(&self, fingerprint: &ScrapeFingerprint) -> Option<T> {
        let key = fingerprint.cache_key();
        let raw = self.store.get(&Self::store_key(&key)).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("discarding undecodable cache entry: {}", e);
                self.store.del(&Self::store_key(&key)).await;
                None
            }
        }
    }

    /// Store an artifact under the fingerprint.
    pub async fn set(&self, fingerprint: &ScrapeFingerprint, value: &T) -> StoreResult<()> {
        let key = fingerprint.cache_key();
        let raw = serde_json::to_string(value)?;
        self.store
            .set(&Self::store_key(&key), &raw, Some(self.ttl))
            .await
    }

    /// Remove one entry.
    pub async fn delete(&self, fingerprint: &ScrapeFingerprint) -> bool {
        let key = fingerprint.cache_key();
        self.store.del(&Self::store_key(&key)).await
    }

    /// Remove every entry matching `pattern` (over the fingerprint JSON),
    /// `*` clears all. Returns the number removed.
    pub async fn clear(&self, pattern: &str) -> usize {
        self.store
            .clear(&format!("{}{}", CACHE_KEY_PREFIX, pattern))
            .await
    }

    /// Fetch from cache or render exactly once per fingerprint.
    ///
    /// Returns `(artifact, cached)` where `cached` is true when no render
    /// ran for this call (cache hit or joined another caller's render).
    pub async fn get_or_render<F, Fut, E>(
        &self,
        fingerprint: &ScrapeFingerprint,
        render: F,
    ) -> StoreResult<(T, bool)>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let key = fingerprint.cache_key();

        if let Some(value) = self.get(fingerprint).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!("cache hit");
            return Ok((value, true));
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        // Join an in-flight render for this fingerprint if one exists,
        // otherwise become the producer.
        let mut rx = {
            let mut in_flight = self.in_flight.lock().await;
            match in_flight.get(&key) {
                Some(tx) => Some(tx.subscribe()),
                None => {
                    let (tx, _) = broadcast::channel(1);
                    in_flight.insert(key.clone(), tx);
                    None
                }
            }
        };

        if let Some(rx) = rx.as_mut() {
            debug!("joining in-flight render");
            return match rx.recv().await {
                Ok(Ok(value)) => Ok((value, true)),
                Ok(Err(msg)) => Err(StoreError::render_failed(msg)),
                Err(_) => Err(StoreError::internal("render producer vanished")),
            };
        }

        let result = render().await;

        // Persist before releasing the in-flight marker so a caller
        // arriving in between sees the entry rather than re-rendering.
        let outcome = match result {
            Ok(value) => {
                if let Err(e) = self.set(fingerprint, &value).await {
                    warn!("failed to persist cache entry: {}", e);
                }
                Ok(value)
            }
            Err(e) => Err(e.to_string()),
        };

        let tx = {
            let mut in_flight = self.in_flight.lock().await;
            in_flight.remove(&key)
        };

        match outcome {
            Ok(value) => {
                if let Some(tx) = tx {
                    let _ = tx.send(Ok(value.clone()));
                }
                Ok((value, false))
            }
            Err(msg) => {
                if let Some(tx) = tx {
                    let _ = tx.send(Err(msg.clone()));
                }
                Err(StoreError::render_failed(msg))
            }
        }
    }

    /// Current statistics.
    pub async fn stats(&self) -> CacheStats {
        let entries = self.store.keys(&format!("{}*", CACHE_KEY_PREFIX)).await.len();
        CacheStats {
            entries,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            in_flight: self.in_flight.lock().await.len(),
            ttl_secs: self.ttl.as_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn cache() -> ScrapeCache<String> {
        ScrapeCache::new(Arc::new(StateStore::in_memory()), DEFAULT_CACHE_TTL)
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let cache = cache();
        let fp = ScrapeFingerprint::for_url("https://example.com");

        let (value, cached) = cache
            .get_or_render(&fp, || async { Ok::<_, StoreError>("body".to_string()) })
            .await
            .unwrap();
        assert_eq!(value, "body");
        assert!(!cached);

        let (value, cached) = cache
            .get_or_render(&fp, || async {
                Err::<String, _>(StoreError::internal("must not render on a hit"))
            })
            .await
            .unwrap();
        assert_eq!(value, "body");
        assert!(cached);
    }

    #[tokio::test]
    async fn test_single_flight_renders_once() {
        let cache = Arc::new(cache());
        let fp = ScrapeFingerprint::for_url("https://example.com/slow");
        let renders = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let fp = fp.clone();
            let renders = Arc::clone(&renders);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_render(&fp, move || async move {
                        renders.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok::<_, StoreError>("rendered".to_string())
                    })
                    .await
                    .unwrap()
                    .0
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), "rendered");
        }
        assert_eq!(renders.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_render_stores_nothing_and_fans_out() {
        let cache = Arc::new(cache());
        let fp = ScrapeFingerprint::for_url("https://example.com/broken");

        let err = cache
            .get_or_render(&fp, || async {
                Err::<String, _>(StoreError::internal("render exploded"))
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("render exploded"));

        assert!(cache.get(&fp).await.is_none());
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let cache = cache();
        let fp = ScrapeFingerprint::for_url("https://example.com");
        cache.set(&fp, &"body".to_string()).await.unwrap();
        assert!(cache.get(&fp).await.is_some());
        assert!(cache.delete(&fp).await);
        assert!(cache.get(&fp).await.is_none());

        cache.set(&fp, &"body".to_string()).await.unwrap();
        assert_eq!(cache.clear("*").await, 1);
        assert!(cache.get(&fp).await.is_none());
    }

    #[tokio::test]
    async fn test_stats_counts() {
        let cache = cache();
        let fp = ScrapeFingerprint::for_url("https://example.com");
        let _ = cache
            .get_or_render(&fp, || async { Ok::<_, StoreError>("x".to_string()) })
            .await;
        let _ = cache
            .get_or_render(&fp, || async { Ok::<_, StoreError>("x".to_string()) })
            .await;

        let stats = cache.stats().await;
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }
}
