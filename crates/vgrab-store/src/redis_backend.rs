//! Redis-backed store.

use std::collections::HashMap;
use std::time::Duration;

use redis::AsyncCommands;
use tracing::{debug, info};

use crate::error::StoreResult;

/// Redis connection configuration.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Whether the remote backend is enabled at all
    pub enabled: bool,
    /// Connection URL
    pub url: String,
    /// Optional password, injected into the URL when set
    pub password: Option<String>,
    /// Prefix applied to every key and hash name
    pub key_prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: "redis://localhost:6379".to_string(),
            password: None,
            key_prefix: "vgrab:".to_string(),
        }
    }
}

impl RedisConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            enabled: std::env::var("REDIS_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            password: std::env::var("REDIS_PASSWORD").ok().filter(|s| !s.is_empty()),
            key_prefix: std::env::var("REDIS_KEY_PREFIX")
                .unwrap_or_else(|_| "vgrab:".to_string()),
        }
    }

    /// Connection URL with the password applied.
    fn connection_url(&self) -> String {
        match &self.password {
            Some(password) if !self.url.contains('@') => {
                // redis://host:port -> redis://:password@host:port
                if let Some(rest) = self.url.strip_prefix("redis://") {
                    format!("redis://:{}@{}", password, rest)
                } else if let Some(rest) = self.url.strip_prefix("rediss://") {
                    format!("rediss://:{}@{}", password, rest)
                } else {
                    self.url.clone()
                }
            }
            _ => self.url.clone(),
        }
    }
}

/// Remote store over a multiplexed Redis connection.
pub struct RedisStore {
    client: redis::Client,
    key_prefix: String,
}

impl RedisStore {
    /// Create a new Redis store. Does not connect eagerly.
    pub fn new(config: &RedisConfig) -> StoreResult<Self> {
        let client = redis::Client::open(config.connection_url().as_str())?;
        Ok(Self {
            client,
            key_prefix: config.key_prefix.clone(),
        })
    }

    fn prefixed(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    async fn conn(&self) -> StoreResult<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    /// PING the server, used for availability probing.
    pub async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        redis::cmd("PING").query_async::<()>(&mut conn).await?;
        Ok(())
    }

    pub async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn().await?;
        Ok(conn.get(self.prefixed(key)).await?)
    }

    pub async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let key = self.prefixed(key);
        match ttl {
            Some(ttl) => {
                conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1)).await?;
            }
            None => {
                conn.set::<_, _, ()>(key, value).await?;
            }
        }
        Ok(())
    }

    pub async fn del(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        let removed: u64 = conn.del(self.prefixed(key)).await?;
        Ok(removed > 0)
    }

    pub async fn hget(&self, hash: &str, field: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn().await?;
        Ok(conn.hget(self.prefixed(hash), field).await?)
    }

    pub async fn hset(&self, hash: &str, field: &str, value: &str) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        conn.hset::<_, _, _, ()>(self.prefixed(hash), field, value).await?;
        Ok(())
    }

    pub async fn hdel(&self, hash: &str, field: &str) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        let removed: u64 = conn.hdel(self.prefixed(hash), field).await?;
        Ok(removed > 0)
    }

    pub async fn hgetall(&self, hash: &str) -> StoreResult<HashMap<String, String>> {
        let mut conn = self.conn().await?;
        Ok(conn.hgetall(self.prefixed(hash)).await?)
    }

    /// List keys matching `pattern` using cursor-based SCAN.
    ///
    /// `KEYS` blocks the server on large stores; SCAN walks it in batches.
    pub async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.conn().await?;
        let full_pattern = self.prefixed(pattern);
        let mut cursor: u64 = 0;
        let mut found = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&full_pattern)
                .arg("COUNT")
                .arg(200)
                .query_async(&mut conn)
                .await?;

            for key in batch {
                // Strip the prefix so callers see logical keys.
                found.push(
                    key.strip_prefix(&self.key_prefix)
                        .map(String::from)
                        .unwrap_or(key),
                );
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(found)
    }

    /// Delete all keys matching `pattern`; returns the number removed.
    pub async fn clear(&self, pattern: &str) -> StoreResult<usize> {
        let keys = self.keys(pattern).await?;
        if keys.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn().await?;
        let mut removed = 0usize;
        for chunk in keys.chunks(100) {
            let prefixed: Vec<String> = chunk.iter().map(|k| self.prefixed(k)).collect();
            let count: u64 = conn.del(prefixed).await?;
            removed += count as usize;
        }

        debug!(pattern, removed, "cleared keys");
        Ok(removed)
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("key_prefix", &self.key_prefix)
            .finish()
    }
}

/// Log the effective backend configuration at startup.
pub fn log_backend_choice(config: &RedisConfig) {
    if config.enabled {
        info!(url = %config.url, prefix = %config.key_prefix, "state store: redis with memory fallback");
    } else {
        info!("state store: in-memory only");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_url_injects_password() {
        let config = RedisConfig {
            enabled: true,
            url: "redis://example:6379".to_string(),
            password: Some("secret".to_string()),
            key_prefix: "p:".to_string(),
        };
        assert_eq!(config.connection_url(), "redis://:secret@example:6379");
    }

    #[test]
    fn test_connection_url_keeps_existing_auth() {
        let config = RedisConfig {
            enabled: true,
            url: "redis://user:pw@example:6379".to_string(),
            password: Some("other".to_string()),
            key_prefix: "p:".to_string(),
        };
        assert_eq!(config.connection_url(), "redis://user:pw@example:6379");
    }
}
