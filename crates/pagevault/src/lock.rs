//! Single-flight regeneration lock

use std::time::Duration;
use tracing::warn;

use pagevault_core::{KvStore, Result};

use crate::key::CacheKeys;

/// At most one request regenerates a given page at a time
///
/// The lock is a plain key created with add-if-absent. Its TTL bounds how
/// long a crashed holder can block regeneration.
#[derive(Debug, Clone)]
pub struct RegenerationLock {
    ttl: Duration,
}

impl RegenerationLock {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns `true` if this caller now holds the lock
    pub async fn try_acquire<S: KvStore + ?Sized>(&self, store: &S, keys: &CacheKeys) -> Result<bool> {
        store.add(&keys.lock, b"1".to_vec(), self.ttl).await
    }

    /// Release the lock, logging failures
    ///
    /// Returns `false` if the store call failed.
    pub async fn release<S: KvStore + ?Sized>(&self, store: &S, keys: &CacheKeys) -> bool {
        match store.delete(&keys.lock).await {
            Ok(_) => true,
            Err(e) => {
                warn!(key = %keys.cache_key, error = %e, "failed to release regeneration lock");
                false
            }
        }
    }
}
