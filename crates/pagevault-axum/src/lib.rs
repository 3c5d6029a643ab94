//! Axum integration for pagevault
//!
//! [`PageCacheLayer`] wraps a router so `GET` and `HEAD` pages are served
//! from the cache or captured after rendering. Handlers can opt a single
//! response out of caching with the [`CacheCancel`] extractor.

pub mod extractor;
pub mod layer;
pub mod middleware;

pub use extractor::{Cache, CacheCancel, CancelHandle};
pub use layer::PageCacheLayer;
pub use middleware::PageCacheMiddleware;
