//! Default `Cache` implementation: an in-memory map with an optional Redis
//! backend, falling back to memory if Redis is unreachable. Directly
//! generalized from the teacher's `gateway_caching::CacheManager` — same
//! Redis-first-then-memory read/write order, the same atomic
//! increment-with-expiry pattern for counters.

use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use redis::AsyncCommands;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::CapabilityError;
use crate::platform::Cache;

struct Entry {
    data: Value,
    created_at: SystemTime,
    ttl: Duration,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.created_at.elapsed().unwrap_or_default() > self.ttl
    }
}

static MEMORY: OnceLock<RwLock<HashMap<String, Entry>>> = OnceLock::new();

fn memory() -> &'static RwLock<HashMap<String, Entry>> {
    MEMORY.get_or_init(|| RwLock::new(HashMap::new()))
}

pub struct MemoryOrRedisCache {
    redis_client: Option<redis::Client>,
    default_ttl: Duration,
    max_entries: usize,
}

impl MemoryOrRedisCache {
    pub fn new(redis_url: Option<&str>, default_ttl: Duration, max_entries: usize) -> Self {
        let redis_client = redis_url.and_then(|url| match redis::Client::open(url) {
            Ok(client) => Some(client),
            Err(err) => {
                tracing::warn!(error = %err, "redis cache backend unavailable, falling back to memory");
                None
            }
        });
        Self {
            redis_client,
            default_ttl,
            max_entries,
        }
    }

    async fn redis_get(&self, key: &str) -> Option<Value> {
        let client = self.redis_client.as_ref()?;
        let mut conn = client.get_multiplexed_tokio_connection().await.ok()?;
        let raw: Option<String> = conn.get(key).await.ok()?;
        raw.and_then(|s| serde_json::from_str(&s).ok())
    }

    async fn redis_set(&self, key: &str, value: &Value, ttl: Duration) -> bool {
        let Some(client) = self.redis_client.as_ref() else {
            return false;
        };
        let Ok(mut conn) = client.get_multiplexed_tokio_connection().await else {
            return false;
        };
        let raw = match serde_json::to_string(value) {
            Ok(s) => s,
            Err(_) => return false,
        };
        conn.set_ex::<_, _, ()>(key, raw, ttl.as_secs().max(1))
            .await
            .is_ok()
    }
}

#[async_trait]
impl Cache for MemoryOrRedisCache {
    async fn get(&self, key: &str) -> Result<Option<Value>, CapabilityError> {
        if let Some(value) = self.redis_get(key).await {
            return Ok(Some(value));
        }
        let mut guard = memory().write().await;
        if let Some(entry) = guard.get(key) {
            if entry.is_expired() {
                guard.remove(key);
                return Ok(None);
            }
            return Ok(Some(entry.data.clone()));
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<(), CapabilityError> {
        let ttl = ttl.unwrap_or(self.default_ttl);
        if self.redis_set(key, &value, ttl).await {
            return Ok(());
        }
        let mut guard = memory().write().await;
        if guard.len() >= self.max_entries {
            if let Some(oldest_key) = guard
                .iter()
                .min_by_key(|(_, e)| e.created_at)
                .map(|(k, _)| k.clone())
            {
                guard.remove(&oldest_key);
            }
        }
        guard.insert(
            key.to_string(),
            Entry {
                data: value,
                created_at: SystemTime::now(),
                ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CapabilityError> {
        if let Some(client) = &self.redis_client {
            if let Ok(mut conn) = client.get_multiplexed_tokio_connection().await {
                let _: Result<(), _> = conn.del(key).await;
            }
        }
        memory().write().await.remove(key);
        Ok(())
    }

    async fn incr(&self, key: &str, by: i64, ttl: Duration) -> Result<i64, CapabilityError> {
        if let Some(client) = &self.redis_client {
            if let Ok(mut conn) = client.get_multiplexed_tokio_connection().await {
                let count: i64 = conn
                    .incr(key, by)
                    .await
                    .map_err(|e| CapabilityError::Backend(e.to_string()))?;
                if count == by {
                    let _: Result<(), _> = conn.expire(key, ttl.as_secs() as i64).await;
                }
                return Ok(count);
            }
        }
        let mut guard = memory().write().await;
        let entry = guard.entry(key.to_string()).or_insert_with(|| Entry {
            data: Value::from(0i64),
            created_at: SystemTime::now(),
            ttl,
        });
        if entry.is_expired() {
            entry.data = Value::from(0i64);
            entry.created_at = SystemTime::now();
        }
        let current = entry.data.as_i64().unwrap_or(0) + by;
        entry.data = Value::from(current);
        Ok(current)
    }

    async fn clear(&self) -> Result<(), CapabilityError> {
        if let Some(client) = &self.redis_client {
            if let Ok(mut conn) = client.get_multiplexed_tokio_connection().await {
                let _: Result<(), _> = redis::cmd("FLUSHDB").query_async(&mut conn).await;
            }
        }
        memory().write().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_roundtrip() {
        let cache = MemoryOrRedisCache::new(None, Duration::from_secs(60), 100);
        cache
            .set("jobs:a", Value::from(42), None)
            .await
            .unwrap();
        let got = cache.get("jobs:a").await.unwrap();
        assert_eq!(got, Some(Value::from(42)));
    }

    #[tokio::test]
    async fn incr_accumulates() {
        let cache = MemoryOrRedisCache::new(None, Duration::from_secs(60), 100);
        let key = "counter:test:incr_accumulates";
        cache.delete(key).await.unwrap();
        let first = cache.incr(key, 1, Duration::from_secs(60)).await.unwrap();
        let second = cache.incr(key, 1, Duration::from_secs(60)).await.unwrap();
        assert_eq!(second, first + 1);
    }
}
