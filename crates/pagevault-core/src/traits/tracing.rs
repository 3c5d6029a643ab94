use crate::{BypassReason, CacheMetrics, CacheStatus, StoreOperation};
use std::time::Duration;
use tracing::{debug, warn};

/// Metrics adapter that logs events via `tracing`
#[derive(Debug, Clone, Default)]
pub struct TracingMetrics {
    /// Service name/prefix (optional)
    service_name: Option<String>,
}

impl TracingMetrics {
    /// Create new tracing metrics adapter
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with service name prefix
    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }
}

impl CacheMetrics for TracingMetrics {
    fn record_outcome(&self, status: CacheStatus) {
        debug!(
            target: "pagevault",
            event = "outcome",
            status = status.as_str(),
            service = ?self.service_name,
            "Page cache outcome"
        );
    }

    fn record_bypass(&self, reason: BypassReason) {
        debug!(
            target: "pagevault",
            event = "bypass",
            reason = reason.as_str(),
            service = ?self.service_name,
            "Page cache bypass"
        );
    }

    fn record_stale_serve(&self) {
        debug!(
            target: "pagevault",
            event = "stale_serve",
            service = ?self.service_name,
            "Served stale page"
        );
    }

    fn record_regeneration(&self, generation: Duration) {
        debug!(
            target: "pagevault",
            event = "regeneration",
            generation_ms = generation.as_millis(),
            service = ?self.service_name,
            "Page regenerated"
        );
    }

    fn record_latency(&self, operation: StoreOperation, duration: Duration) {
        tracing::trace!(
            target: "pagevault",
            event = "latency",
            operation = operation.as_str(),
            duration_ms = duration.as_millis(),
            service = ?self.service_name,
            "Store operation latency"
        );
    }

    fn record_store_error(&self, operation: StoreOperation) {
        warn!(
            target: "pagevault",
            event = "store_error",
            operation = operation.as_str(),
            service = ?self.service_name,
            "Store operation failed"
        );
    }
}
