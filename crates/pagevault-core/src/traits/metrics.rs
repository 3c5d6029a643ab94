//! Metrics trait for page cache observability

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::{BypassReason, CacheStats, CacheStatus};

/// Store operation for latency tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    Get,
    Set,
    Add,
    Increment,
    Delete,
}

impl StoreOperation {
    /// Get operation as string label
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreOperation::Get => "get",
            StoreOperation::Set => "set",
            StoreOperation::Add => "add",
            StoreOperation::Increment => "increment",
            StoreOperation::Delete => "delete",
        }
    }
}

/// Trait for cache metrics/observability
///
/// Implement this to integrate with your metrics system (Prometheus, StatsD, etc.)
pub trait CacheMetrics: Send + Sync + 'static {
    /// Record the final status of a response
    fn record_outcome(&self, status: CacheStatus);

    /// Record why a response bypassed the cache
    fn record_bypass(&self, reason: BypassReason);

    /// Record a hit served from an expired entry
    fn record_stale_serve(&self);

    /// Record a stored regeneration and how long origin took
    fn record_regeneration(&self, generation: Duration);

    /// Record store call latency
    fn record_latency(&self, operation: StoreOperation, duration: Duration);

    /// Record a failed store call
    fn record_store_error(&self, operation: StoreOperation);
}

/// No-op metrics implementation (default)
///
/// Zero overhead when metrics are not needed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl CacheMetrics for NoopMetrics {
    #[inline]
    fn record_outcome(&self, _status: CacheStatus) {}

    #[inline]
    fn record_bypass(&self, _reason: BypassReason) {}

    #[inline]
    fn record_stale_serve(&self) {}

    #[inline]
    fn record_regeneration(&self, _generation: Duration) {}

    #[inline]
    fn record_latency(&self, _operation: StoreOperation, _duration: Duration) {}

    #[inline]
    fn record_store_error(&self, _operation: StoreOperation) {}
}

/// In-process counters that snapshot into [`CacheStats`]
#[derive(Debug, Default)]
pub struct StatsMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    bypasses: AtomicU64,
    down: AtomicU64,
    stale_serves: AtomicU64,
    regenerations: AtomicU64,
    store_errors: AtomicU64,
}

impl StatsMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point-in-time copy of the counters
    pub fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            bypasses: self.bypasses.load(Ordering::Relaxed),
            down: self.down.load(Ordering::Relaxed),
            stale_serves: self.stale_serves.load(Ordering::Relaxed),
            regenerations: self.regenerations.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
        }
    }
}

impl CacheMetrics for StatsMetrics {
    fn record_outcome(&self, status: CacheStatus) {
        let counter = match status {
            CacheStatus::Hit => &self.hits,
            CacheStatus::Miss => &self.misses,
            CacheStatus::Bypass => &self.bypasses,
            CacheStatus::Down => &self.down,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn record_bypass(&self, _reason: BypassReason) {}

    fn record_stale_serve(&self) {
        self.stale_serves.fetch_add(1, Ordering::Relaxed);
    }

    fn record_regeneration(&self, _generation: Duration) {
        self.regenerations.fetch_add(1, Ordering::Relaxed);
    }

    fn record_latency(&self, _operation: StoreOperation, _duration: Duration) {}

    fn record_store_error(&self, _operation: StoreOperation) {
        self.store_errors.fetch_add(1, Ordering::Relaxed);
    }
}

impl<T: CacheMetrics + ?Sized> CacheMetrics for std::sync::Arc<T> {
    fn record_outcome(&self, status: CacheStatus) {
        (**self).record_outcome(status)
    }

    fn record_bypass(&self, reason: BypassReason) {
        (**self).record_bypass(reason)
    }

    fn record_stale_serve(&self) {
        (**self).record_stale_serve()
    }

    fn record_regeneration(&self, generation: Duration) {
        (**self).record_regeneration(generation)
    }

    fn record_latency(&self, operation: StoreOperation, duration: Duration) {
        (**self).record_latency(operation, duration)
    }

    fn record_store_error(&self, operation: StoreOperation) {
        (**self).record_store_error(operation)
    }
}

/// Metrics adapter using the `metrics` crate
///
/// Integrates with Prometheus, StatsD, and other exporters via the `metrics` ecosystem.
///
/// # Example
/// ```ignore
/// use pagevault_core::MetricsCrateAdapter;
///
/// // Set up a metrics recorder (e.g., prometheus_exporter)
/// // metrics::set_global_recorder(recorder);
///
/// let metrics = MetricsCrateAdapter::new("pagevault");
/// // Emits: pagevault_responses_total{status="HIT"}, pagevault_bypasses_total, etc.
/// ```
#[cfg(feature = "metrics")]
#[derive(Debug, Clone)]
pub struct MetricsCrateAdapter {
    prefix: String,
}

#[cfg(feature = "metrics")]
impl MetricsCrateAdapter {
    /// Create a new adapter with the given metric name prefix
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn metric_name(&self, name: &str) -> String {
        format!("{}_{}", self.prefix, name)
    }
}

#[cfg(feature = "metrics")]
impl CacheMetrics for MetricsCrateAdapter {
    fn record_outcome(&self, status: CacheStatus) {
        metrics::counter!(self.metric_name("responses_total"), "status" => status.as_str())
            .increment(1);
    }

    fn record_bypass(&self, reason: BypassReason) {
        metrics::counter!(self.metric_name("bypasses_total"), "reason" => reason.as_str())
            .increment(1);
    }

    fn record_stale_serve(&self) {
        metrics::counter!(self.metric_name("stale_serves_total")).increment(1);
    }

    fn record_regeneration(&self, generation: Duration) {
        metrics::counter!(self.metric_name("regenerations_total")).increment(1);
        metrics::histogram!(self.metric_name("generation_duration_seconds"))
            .record(generation.as_secs_f64());
    }

    fn record_latency(&self, operation: StoreOperation, duration: Duration) {
        metrics::histogram!(
            self.metric_name("store_duration_seconds"),
            "operation" => operation.as_str()
        )
        .record(duration.as_secs_f64());
    }

    fn record_store_error(&self, operation: StoreOperation) {
        metrics::counter!(
            self.metric_name("store_errors_total"),
            "operation" => operation.as_str()
        )
        .increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_as_str() {
        assert_eq!(StoreOperation::Get.as_str(), "get");
        assert_eq!(StoreOperation::Increment.as_str(), "increment");
    }

    #[test]
    fn test_noop_metrics() {
        let metrics = NoopMetrics;
        // Just verify these don't panic
        metrics.record_outcome(CacheStatus::Hit);
        metrics.record_bypass(BypassReason::Auth);
        metrics.record_latency(StoreOperation::Get, Duration::from_millis(1));
    }

    #[test]
    fn test_stats_metrics_snapshot() {
        let metrics = StatsMetrics::new();
        metrics.record_outcome(CacheStatus::Hit);
        metrics.record_outcome(CacheStatus::Hit);
        metrics.record_outcome(CacheStatus::Miss);
        metrics.record_outcome(CacheStatus::Down);
        metrics.record_stale_serve();
        metrics.record_regeneration(Duration::from_millis(40));
        metrics.record_store_error(StoreOperation::Set);

        let stats = metrics.snapshot();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.down, 1);
        assert_eq!(stats.stale_serves, 1);
        assert_eq!(stats.regenerations, 1);
        assert_eq!(stats.store_errors, 1);
    }
}
