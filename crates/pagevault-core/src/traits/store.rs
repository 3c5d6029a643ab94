//! Key-value store trait

use async_trait::async_trait;
use std::time::Duration;

use crate::CacheError;

/// The narrow key-value interface the page cache runs on
///
/// The store is the only state shared between concurrent requests. All
/// coordination goes through the per-key atomicity of [`add`](KvStore::add)
/// and [`increment`](KvStore::increment); no multi-key transactions are
/// required. Implementations include an in-memory store and Redis.
#[async_trait]
pub trait KvStore: Send + Sync + 'static {
    /// Get a value
    ///
    /// Returns `None` if the key doesn't exist or has expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Set a value, replacing any existing one
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;

    /// Set a value only if the key is absent
    ///
    /// Returns `true` if this call created the key.
    async fn add(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<bool, CacheError>;

    /// Atomically add `delta` to an integer value
    ///
    /// Missing keys start at zero. Returns the post-increment value.
    async fn increment(&self, key: &str, delta: i64) -> Result<i64, CacheError>;

    /// Delete a key
    ///
    /// Returns `true` if the key existed and was deleted.
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// Short name for logs
    fn name(&self) -> &'static str {
        "kv"
    }
}

#[async_trait]
impl<T: KvStore + ?Sized> KvStore for std::sync::Arc<T> {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        (**self).set(key, value, ttl).await
    }

    async fn add(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<bool, CacheError> {
        (**self).add(key, value, ttl).await
    }

    async fn increment(&self, key: &str, delta: i64) -> Result<i64, CacheError> {
        (**self).increment(key, delta).await
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        (**self).delete(key).await
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}
