use async_trait::async_trait;
use bb8::{Pool, PooledConnection};
use bb8_redis::RedisConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;

use pagevault_core::{CacheError, KvStore, Result};

use super::config::RedisConfig;

/// Redis-backed key-value store
///
/// `add` maps to `SET NX EX`, `increment` to `INCRBY`; both are atomic on
/// the server, which is all the page cache needs for coordination.
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool<RedisConnectionManager>,
    config: RedisConfig,
}

impl RedisStore {
    /// Connect and build the pool
    pub async fn new(config: RedisConfig) -> Result<Self> {
        let manager = RedisConnectionManager::new(config.url.as_str())
            .map_err(|e| CacheError::Connection(e.to_string()))?;

        let pool = Pool::builder()
            .max_size(config.pool_size)
            .connection_timeout(config.connection_timeout)
            .build(manager)
            .await
            .map_err(|e| CacheError::Connection(e.to_string()))?;

        Ok(Self { pool, config })
    }

    fn prefixed_key(&self, key: &str) -> String {
        prefixed(self.config.key_prefix.as_deref(), key)
    }

    async fn get_connection(&self) -> Result<PooledConnection<'_, RedisConnectionManager>> {
        self.pool
            .get()
            .await
            .map_err(|e| CacheError::Connection(e.to_string()))
    }
}

fn prefixed(prefix: Option<&str>, key: &str) -> String {
    match prefix {
        Some(prefix) => format!("{}:{}", prefix, key),
        None => key.to_string(),
    }
}

/// Redis rejects `EX 0`, so round up to at least one second
fn expiry_secs(ttl: Duration) -> u64 {
    (ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0)).max(1)
}

fn backend(e: redis::RedisError) -> CacheError {
    if e.is_io_error() || e.is_connection_dropped() {
        CacheError::Connection(e.to_string())
    } else {
        CacheError::Backend(e.to_string())
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.get_connection().await?;
        conn.get(self.prefixed_key(key)).await.map_err(backend)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let mut conn = self.get_connection().await?;
        let prefixed = self.prefixed_key(key);
        let _: () = if ttl.is_zero() {
            conn.set(&prefixed, value).await.map_err(backend)?
        } else {
            conn.set_ex(&prefixed, value, expiry_secs(ttl))
                .await
                .map_err(backend)?
        };
        Ok(())
    }

    async fn add(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<bool> {
        let mut conn = self.get_connection().await?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(self.prefixed_key(key))
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(expiry_secs(ttl))
            .query_async(&mut *conn)
            .await
            .map_err(backend)?;
        Ok(reply.is_some())
    }

    async fn increment(&self, key: &str, delta: i64) -> Result<i64> {
        let mut conn = self.get_connection().await?;
        let prefixed = self.prefixed_key(key);
        let count: i64 = conn.incr(&prefixed, delta).await.map_err(backend)?;

        // The call that created the counter gives it a lifetime
        if count == delta {
            let secs = expiry_secs(self.config.counter_ttl) as i64;
            let _: () = conn.expire(&prefixed, secs).await.map_err(backend)?;
        }
        Ok(count)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.get_connection().await?;
        let removed: u64 = conn.del(self.prefixed_key(key)).await.map_err(backend)?;
        Ok(removed > 0)
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
