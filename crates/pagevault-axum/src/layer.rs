use pagevault::PageCache;
use pagevault_core::{CacheMetrics, KvStore, Serializer};
use tower::Layer;

use crate::middleware::PageCacheMiddleware;

/// Tower layer that puts a [`PageCache`] in front of a service
pub struct PageCacheLayer<S, Ser, M>
where
    S: KvStore,
    Ser: Serializer,
    M: CacheMetrics,
{
    pub cache: PageCache<S, Ser, M>,
}

impl<S, Ser, M> PageCacheLayer<S, Ser, M>
where
    S: KvStore,
    Ser: Serializer,
    M: CacheMetrics,
{
    pub fn new(cache: PageCache<S, Ser, M>) -> Self {
        Self { cache }
    }
}

impl<S, Ser, M> Clone for PageCacheLayer<S, Ser, M>
where
    S: KvStore,
    Ser: Serializer,
    M: CacheMetrics,
{
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
        }
    }
}

impl<Svc, S, Ser, M> Layer<Svc> for PageCacheLayer<S, Ser, M>
where
    S: KvStore,
    Ser: Serializer,
    M: CacheMetrics,
{
    type Service = PageCacheMiddleware<Svc, S, Ser, M>;

    fn layer(&self, inner: Svc) -> Self::Service {
        PageCacheMiddleware::new(inner, self.cache.clone())
    }
}
