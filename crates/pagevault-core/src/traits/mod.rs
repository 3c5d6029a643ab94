//! Core traits for page cache operations

mod clock;
mod metrics;
mod serializer;
mod store;

#[cfg(feature = "tracing")]
mod tracing;

pub use clock::{Clock, ManualClock, SystemClock};
pub use metrics::{CacheMetrics, NoopMetrics, StatsMetrics, StoreOperation};
pub use serializer::{JsonSerializer, Serializer};
pub use store::KvStore;

#[cfg(feature = "metrics")]
pub use metrics::MetricsCrateAdapter;

#[cfg(feature = "msgpack")]
pub use serializer::MsgPackSerializer;

#[cfg(feature = "bincode")]
pub use serializer::BincodeSerializer;

#[cfg(feature = "tracing")]
pub use self::tracing::TracingMetrics;
