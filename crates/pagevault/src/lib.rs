//! pagevault: full-page HTTP response cache
//!
//! # Features
//!
//! - **Traffic sampling**: only pages that keep getting hits near expiry
//!   are regenerated
//! - **Single-flight regeneration** through an atomic lock in the store
//! - **Stale-while-revalidate** serving while one request re-renders
//! - **Conditional replay** (`304 Not Modified`) and redirect storage
//! - **Pluggable stores** (memory, Redis) and serializers (JSON,
//!   MessagePack, Bincode)
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use pagevault::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
//!     let cache = PageCache::new(MemoryStore::with_defaults())?;
//!
//!     let request = http::Request::get("http://example.com/").body(())?;
//!     match cache.dispatch(RequestView::from_request(&request)).await {
//!         Dispatch::Serve(replay) => println!("HIT: {}", replay.status),
//!         Dispatch::Render(decision) => {
//!             let rendered = RenderedResponse::new(http::StatusCode::OK, "<html>...</html>");
//!             let outcome = cache.capture(decision, rendered).await;
//!             println!("{}", outcome.status);
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod admission;
pub mod config;
pub mod key;
pub mod lock;
mod manager;

// Re-export core
pub use pagevault_core::*;

// Re-export HTTP primitives
pub use pagevault_http::{Replay, RequestView};

// Re-export storage
pub use pagevault_storage::{CircuitBreaker, GuardedStore};

#[cfg(feature = "memory")]
pub use pagevault_storage::{MemoryConfig, MemoryStore};

#[cfg(feature = "redis")]
pub use pagevault_storage::{RedisConfig, RedisStore};

pub use crate::config::load_settings;
pub use key::{CacheIdentity, CacheKeys, KeyBuilder, VariantRegistry, VariantValue};
pub use manager::{
    Action, CacheDecision, CaptureOutcome, Dispatch, PageCache, PageCacheBuilder,
    RenderedResponse,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        BypassReason, CacheDecision, CacheError, CacheSettings, CacheStatus, Dispatch,
        JsonSerializer, PageCache, RenderedResponse, Replay, RequestView, Result, Serializer,
        VariantValue,
    };

    #[cfg(feature = "memory")]
    pub use crate::{MemoryConfig, MemoryStore};

    #[cfg(feature = "msgpack")]
    pub use crate::MsgPackSerializer;

    #[cfg(feature = "bincode")]
    pub use crate::BincodeSerializer;
}
