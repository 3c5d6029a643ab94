//! In-memory key-value store using DashMap

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::time::Duration;

use pagevault_core::{CacheError, Clock, KvStore, Result, SystemClock};

/// Configuration for the memory store
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Maximum number of keys (0 = unlimited)
    pub max_capacity: usize,
    /// Lifetime given to counters created by `increment`
    pub counter_ttl: Option<Duration>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
            counter_ttl: Some(Duration::from_secs(3600)),
        }
    }
}

impl MemoryConfig {
    /// Create config with specific capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            max_capacity: capacity,
            ..Default::default()
        }
    }

    /// Create config with unlimited capacity
    pub fn unlimited() -> Self {
        Self {
            max_capacity: 0,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
struct Slot {
    value: Vec<u8>,
    /// Unix second after which the slot is gone; `None` never expires
    expires_at: Option<u64>,
}

impl Slot {
    fn new(value: Vec<u8>, ttl: Option<Duration>, now: u64) -> Self {
        Self {
            value,
            expires_at: ttl.filter(|t| !t.is_zero()).map(|t| now + ceil_secs(t)),
        }
    }

    fn is_live(&self, now: u64) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

fn ceil_secs(ttl: Duration) -> u64 {
    ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0)
}

/// In-memory key-value store
///
/// Expiry is evaluated lazily against the store's clock, so tests can drive
/// time with a `ManualClock`. Cloning creates a new handle to the SAME
/// underlying map.
#[derive(Clone)]
pub struct MemoryStore {
    data: Arc<DashMap<String, Slot>>,
    clock: Arc<dyn Clock>,
    config: MemoryConfig,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("len", &self.data.len())
            .field("clock", &self.clock)
            .field("config", &self.config)
            .finish()
    }
}

impl MemoryStore {
    /// Create a new memory store on the system clock
    pub fn new(config: MemoryConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }

    /// Create with default configuration
    pub fn with_defaults() -> Self {
        Self::new(MemoryConfig::default())
    }

    /// Create a store that reads time from `clock`
    pub fn with_clock(config: MemoryConfig, clock: impl Clock) -> Self {
        Self {
            data: Arc::new(DashMap::with_capacity(config.max_capacity.min(10_000))),
            clock: Arc::new(clock),
            config,
        }
    }

    /// Number of stored keys, including expired ones not yet purged
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Drop expired slots and return how many were removed
    pub fn cleanup_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.data.len();
        self.data.retain(|_, slot| slot.is_live(now));
        before.saturating_sub(self.data.len())
    }

    /// Make room for one more key
    ///
    /// Must not be called while holding a map guard.
    fn maybe_evict(&self) {
        if self.config.max_capacity == 0 || self.data.len() < self.config.max_capacity {
            return;
        }

        if self.cleanup_expired() > 0 && self.data.len() < self.config.max_capacity {
            return;
        }

        let victims: Vec<String> = self
            .data
            .iter()
            .take(self.data.len().saturating_sub(self.config.max_capacity - 1))
            .map(|slot| slot.key().clone())
            .collect();

        for key in victims {
            self.data.remove(&key);
        }
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let now = self.clock.now();
        if let Some(slot) = self.data.get(key) {
            if slot.is_live(now) {
                return Ok(Some(slot.value.clone()));
            }
        }
        self.data.remove_if(key, |_, slot| !slot.is_live(now));
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        if !self.data.contains_key(key) {
            self.maybe_evict();
        }
        let slot = Slot::new(value, Some(ttl), self.clock.now());
        self.data.insert(key.to_string(), slot);
        Ok(())
    }

    async fn add(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<bool> {
        if !self.data.contains_key(key) {
            self.maybe_evict();
        }
        let now = self.clock.now();
        let slot = Slot::new(value, Some(ttl), now);
        match self.data.entry(key.to_string()) {
            Entry::Occupied(mut existing) => {
                if existing.get().is_live(now) {
                    Ok(false)
                } else {
                    existing.insert(slot);
                    Ok(true)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(slot);
                Ok(true)
            }
        }
    }

    async fn increment(&self, key: &str, delta: i64) -> Result<i64> {
        if !self.data.contains_key(key) {
            self.maybe_evict();
        }
        let now = self.clock.now();
        match self.data.entry(key.to_string()) {
            Entry::Occupied(mut existing) if existing.get().is_live(now) => {
                let slot = existing.get_mut();
                let current = parse_counter(&slot.value)?;
                let next = current
                    .checked_add(delta)
                    .ok_or_else(|| CacheError::Backend("increment overflow".into()))?;
                slot.value = next.to_string().into_bytes();
                Ok(next)
            }
            Entry::Occupied(mut expired) => {
                expired.insert(Slot::new(
                    delta.to_string().into_bytes(),
                    self.config.counter_ttl,
                    now,
                ));
                Ok(delta)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Slot::new(
                    delta.to_string().into_bytes(),
                    self.config.counter_ttl,
                    now,
                ));
                Ok(delta)
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let now = self.clock.now();
        Ok(self
            .data
            .remove(key)
            .is_some_and(|(_, slot)| slot.is_live(now)))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

fn parse_counter(raw: &[u8]) -> Result<i64> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.trim().parse::<i64>().ok())
        .ok_or_else(|| CacheError::Backend("value is not an integer".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagevault_core::ManualClock;

    fn store() -> (MemoryStore, ManualClock) {
        let clock = ManualClock::starting_at(1_000);
        (
            MemoryStore::with_clock(MemoryConfig::default(), clock.clone()),
            clock,
        )
    }

    #[tokio::test]
    async fn test_basic_get_set() {
        let (store, _) = store();

        store
            .set("key1", b"value1".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();

        let result = store.get("key1").await.unwrap();
        assert_eq!(result, Some(b"value1".to_vec()));
    }

    #[tokio::test]
    async fn test_get_nonexistent() {
        let (store, _) = store();
        assert!(store.get("nonexistent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let (store, clock) = store();
        store
            .set("page", b"<html>".to_vec(), Duration::from_secs(10))
            .await
            .unwrap();

        clock.advance(9);
        assert!(store.get("page").await.unwrap().is_some());

        clock.advance(1);
        assert!(store.get("page").await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_add_only_if_absent() {
        let (store, clock) = store();
        let ttl = Duration::from_secs(10);

        assert!(store.add("lock", b"1".to_vec(), ttl).await.unwrap());
        assert!(!store.add("lock", b"2".to_vec(), ttl).await.unwrap());
        assert_eq!(store.get("lock").await.unwrap(), Some(b"1".to_vec()));

        // An expired key counts as absent
        clock.advance(10);
        assert!(store.add("lock", b"3".to_vec(), ttl).await.unwrap());
    }

    #[tokio::test]
    async fn test_add_is_atomic_under_contention() {
        let store = MemoryStore::with_defaults();
        let mut handles = Vec::new();
        for i in 0..32u8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .add("genlock", vec![i], Duration::from_secs(10))
                    .await
                    .unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_increment_creates_at_zero() {
        let (store, _) = store();
        assert_eq!(store.increment("reqs", 1).await.unwrap(), 1);
        assert_eq!(store.increment("reqs", 1).await.unwrap(), 2);
        assert_eq!(store.increment("reqs", 5).await.unwrap(), 7);
        assert_eq!(store.get("reqs").await.unwrap(), Some(b"7".to_vec()));
    }

    #[tokio::test]
    async fn test_increment_counter_ttl() {
        let (store, clock) = store();
        store.increment("reqs", 1).await.unwrap();
        clock.advance(3600);
        assert_eq!(store.increment("reqs", 1).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_increment_rejects_non_integer() {
        let (store, _) = store();
        store
            .set("page", b"<html>".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        let err = store.increment("page", 1).await.unwrap_err();
        assert!(matches!(err, CacheError::Backend(_)));
    }

    #[tokio::test]
    async fn test_delete() {
        let (store, clock) = store();
        let ttl = Duration::from_secs(5);
        store.set("key1", b"value1".to_vec(), ttl).await.unwrap();

        assert!(store.delete("key1").await.unwrap());
        assert!(!store.delete("key1").await.unwrap());

        store.set("key2", b"value2".to_vec(), ttl).await.unwrap();
        clock.advance(5);
        assert!(!store.delete("key2").await.unwrap());
    }

    #[tokio::test]
    async fn test_capacity_eviction() {
        let store = MemoryStore::new(MemoryConfig::with_capacity(2));
        let ttl = Duration::from_secs(60);

        store.set("key1", b"value1".to_vec(), ttl).await.unwrap();
        store.set("key2", b"value2".to_vec(), ttl).await.unwrap();
        store.set("key3", b"value3".to_vec(), ttl).await.unwrap();

        assert!(store.len() <= 2);
        assert!(store.get("key3").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_eviction_prefers_expired() {
        let clock = ManualClock::starting_at(0);
        let store = MemoryStore::with_clock(MemoryConfig::with_capacity(2), clock.clone());

        store.set("old", b"1".to_vec(), Duration::from_secs(1)).await.unwrap();
        store.set("live", b"2".to_vec(), Duration::from_secs(60)).await.unwrap();
        clock.advance(2);
        store.set("new", b"3".to_vec(), Duration::from_secs(60)).await.unwrap();

        assert!(store.get("live").await.unwrap().is_some());
        assert!(store.get("new").await.unwrap().is_some());
    }
}
