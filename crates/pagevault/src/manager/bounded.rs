//! Store wrapper that bounds, times and counts every call

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

use pagevault_core::{CacheError, CacheMetrics, KvStore, Result, StoreOperation};

/// Every call finishes within `timeout` or fails with `CacheError::Timeout`
pub(crate) struct BoundedStore<S, M> {
    inner: S,
    metrics: Arc<M>,
    timeout: Duration,
}

impl<S: KvStore, M: CacheMetrics> BoundedStore<S, M> {
    pub(crate) fn new(inner: S, metrics: Arc<M>, timeout: Duration) -> Self {
        Self {
            inner,
            metrics,
            timeout,
        }
    }

    pub(crate) fn inner(&self) -> &S {
        &self.inner
    }

    async fn bounded<T, F>(&self, operation: StoreOperation, key: &str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send,
    {
        let start = Instant::now();
        let result = match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout),
        };
        self.metrics.record_latency(operation, start.elapsed());
        if let Err(e) = &result {
            self.metrics.record_store_error(operation);
            warn!(
                store = self.inner.name(),
                operation = operation.as_str(),
                key,
                error = %e,
                "store call failed"
            );
        }
        result
    }
}

#[async_trait]
impl<S: KvStore, M: CacheMetrics> KvStore for BoundedStore<S, M> {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.bounded(StoreOperation::Get, key, self.inner.get(key)).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        self.bounded(StoreOperation::Set, key, self.inner.set(key, value, ttl))
            .await
    }

    async fn add(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<bool> {
        self.bounded(StoreOperation::Add, key, self.inner.add(key, value, ttl))
            .await
    }

    async fn increment(&self, key: &str, delta: i64) -> Result<i64> {
        self.bounded(StoreOperation::Increment, key, self.inner.increment(key, delta))
            .await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.bounded(StoreOperation::Delete, key, self.inner.delete(key))
            .await
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}
