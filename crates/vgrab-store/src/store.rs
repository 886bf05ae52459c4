//! Composed state store: Redis preferred, memory fallback.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::StoreResult;
use crate::memory::MemoryStore;
use crate::redis_backend::{log_backend_choice, RedisConfig, RedisStore};

/// Interval between availability probes of the remote backend.
const PROBE_INTERVAL: Duration = Duration::from_secs(15);

/// Unified key-value + hash store.
///
/// Reads prefer the remote backend and fall back silently to memory on
/// error; writes go to whichever backend is live at that moment. A failed
/// remote call marks the remote unavailable until the next successful
/// probe. There are no cross-backend transactional guarantees.
pub struct StateStore {
    remote: Option<RedisStore>,
    memory: MemoryStore,
    remote_available: AtomicBool,
}

impl StateStore {
    /// Build from config; a disabled remote yields a memory-only store.
    pub fn new(config: &RedisConfig) -> Self {
        log_backend_choice(config);
        let remote = if config.enabled {
            match RedisStore::new(config) {
                Ok(store) => Some(store),
                Err(e) => {
                    warn!("failed to initialize redis client, using memory only: {}", e);
                    None
                }
            }
        } else {
            None
        };

        Self {
            remote_available: AtomicBool::new(remote.is_some()),
            remote,
            memory: MemoryStore::new(),
        }
    }

    /// Memory-only store, for tests and redis-less deployments.
    pub fn in_memory() -> Self {
        Self {
            remote: None,
            memory: MemoryStore::new(),
            remote_available: AtomicBool::new(false),
        }
    }

    /// Whether the remote backend answered its last probe or call.
    pub fn remote_available(&self) -> bool {
        self.remote.is_some() && self.remote_available.load(Ordering::Relaxed)
    }

    /// Spawn the availability probe loop, which also sweeps expired
    /// memory entries. The handle never completes on its own; abort it
    /// at shutdown.
    pub fn spawn_probe(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(PROBE_INTERVAL);
            loop {
                interval.tick().await;
                store.probe().await;
                let swept = store.sweep_expired().await;
                if swept > 0 {
                    debug!(swept, "swept expired entries");
                }
            }
        })
    }

    /// Probe the remote backend once and update the availability flag.
    pub async fn probe(&self) {
        let Some(remote) = &self.remote else { return };
        let was = self.remote_available.load(Ordering::Relaxed);
        match remote.ping().await {
            Ok(()) => {
                if !was {
                    debug!("redis backend recovered");
                }
                self.remote_available.store(true, Ordering::Relaxed);
            }
            Err(e) => {
                if was {
                    warn!("redis backend unavailable: {}", e);
                }
                self.remote_available.store(false, Ordering::Relaxed);
            }
        }
    }

    fn mark_remote_failed(&self, op: &str, e: &crate::StoreError) {
        if self.remote_available.swap(false, Ordering::Relaxed) {
            warn!("redis {} failed, falling back to memory: {}", op, e);
        }
    }

    fn live_remote(&self) -> Option<&RedisStore> {
        if self.remote_available.load(Ordering::Relaxed) {
            self.remote.as_ref()
        } else {
            None
        }
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        if let Some(remote) = self.live_remote() {
            match remote.get(key).await {
                Ok(value) => return value,
                Err(e) => self.mark_remote_failed("get", &e),
            }
        }
        self.memory.get(key).await
    }

    pub async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()> {
        if let Some(remote) = self.live_remote() {
            match remote.set(key, value, ttl).await {
                Ok(()) => return Ok(()),
                Err(e) => self.mark_remote_failed("set", &e),
            }
        }
        self.memory.set(key, value, ttl).await;
        Ok(())
    }

    pub async fn del(&self, key: &str) -> bool {
        if let Some(remote) = self.live_remote() {
            match remote.del(key).await {
                Ok(removed) => return removed,
                Err(e) => self.mark_remote_failed("del", &e),
            }
        }
        self.memory.del(key).await
    }

    pub async fn hget(&self, hash: &str, field: &str) -> Option<String> {
        if let Some(remote) = self.live_remote() {
            match remote.hget(hash, field).await {
                Ok(value) => return value,
                Err(e) => self.mark_remote_failed("hget", &e),
            }
        }
        self.memory.hget(hash, field).await
    }

    pub async fn hset(&self, hash: &str, field: &str, value: &str) -> StoreResult<()> {
        if let Some(remote) = self.live_remote() {
            match remote.hset(hash, field, value).await {
                Ok(()) => return Ok(()),
                Err(e) => self.mark_remote_failed("hset", &e),
            }
        }
        self.memory.hset(hash, field, value).await;
        Ok(())
    }

    pub async fn hdel(&self, hash: &str, field: &str) -> bool {
        if let Some(remote) = self.live_remote() {
            match remote.hdel(hash, field).await {
                Ok(removed) => return removed,
                Err(e) => self.mark_remote_failed("hdel", &e),
            }
        }
        self.memory.hdel(hash, field).await
    }

    pub async fn hgetall(&self, hash: &str) -> HashMap<String, String> {
        if let Some(remote) = self.live_remote() {
            match remote.hgetall(hash).await {
                Ok(map) => return map,
                Err(e) => self.mark_remote_failed("hgetall", &e),
            }
        }
        self.memory.hgetall(hash).await
    }

    pub async fn keys(&self, pattern: &str) -> Vec<String> {
        if let Some(remote) = self.live_remote() {
            match remote.keys(pattern).await {
                Ok(keys) => return keys,
                Err(e) => self.mark_remote_failed("keys", &e),
            }
        }
        self.memory.keys(pattern).await
    }

    /// Remove matching keys from both backends; returns the larger count.
    pub async fn clear(&self, pattern: &str) -> usize {
        let mut removed = 0usize;
        if let Some(remote) = self.live_remote() {
            match remote.clear(pattern).await {
                Ok(count) => removed = count,
                Err(e) => self.mark_remote_failed("clear", &e),
            }
        }
        let memory_removed = self.memory.clear(pattern).await;
        removed.max(memory_removed)
    }

    /// Lazily evict expired memory entries.
    pub async fn sweep_expired(&self) -> usize {
        self.memory.sweep_expired().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_only_roundtrip() {
        let store = StateStore::in_memory();
        assert!(!store.remote_available());

        store.set("k", "v", None).await.unwrap();
        assert_eq!(store.get("k").await.as_deref(), Some("v"));
        assert!(store.del("k").await);
        assert_eq!(store.get("k").await, None);
    }

    #[tokio::test]
    async fn test_hash_roundtrip() {
        let store = StateStore::in_memory();
        store.hset("urls", "a", "1").await.unwrap();
        store.hset("urls", "b", "2").await.unwrap();
        assert_eq!(store.hget("urls", "a").await.as_deref(), Some("1"));
        assert_eq!(store.hgetall("urls").await.len(), 2);
        assert!(store.hdel("urls", "a").await);
        assert_eq!(store.hget("urls", "a").await, None);
    }

    #[tokio::test]
    async fn test_clear_pattern() {
        let store = StateStore::in_memory();
        store.set("cache:1", "a", None).await.unwrap();
        store.set("cache:2", "b", None).await.unwrap();
        store.set("keep", "c", None).await.unwrap();
        assert_eq!(store.clear("cache:*").await, 2);
        assert_eq!(store.get("keep").await.as_deref(), Some("c"));
    }
}
