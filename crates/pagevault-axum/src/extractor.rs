use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use pagevault::PageCache;
use pagevault_core::{CacheMetrics, KvStore, Serializer};

/// Flag a handler sets to keep its response out of the cache
///
/// The middleware puts one into the request extensions before calling the
/// handler and reads it back once the body has been buffered.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Do not store the response being rendered
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Extractor for the current request's [`CancelHandle`]
///
/// Outside the cache layer, or for a request that is not being captured,
/// this yields a detached handle and cancelling it has no effect.
#[derive(Debug, Clone)]
pub struct CacheCancel(pub CancelHandle);

impl<State> FromRequestParts<State> for CacheCancel
where
    State: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &State) -> Result<Self, Self::Rejection> {
        let handle = parts
            .extensions
            .get::<CancelHandle>()
            .cloned()
            .unwrap_or_default();
        Ok(CacheCancel(handle))
    }
}

impl std::ops::Deref for CacheCancel {
    type Target = CancelHandle;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Extractor to access the [`PageCache`] from router state
pub struct Cache<S, Ser, M>(pub PageCache<S, Ser, M>)
where
    S: KvStore,
    Ser: Serializer,
    M: CacheMetrics;

impl<State, S, Ser, M> FromRequestParts<State> for Cache<S, Ser, M>
where
    S: KvStore,
    Ser: Serializer,
    M: CacheMetrics,
    State: Send + Sync,
    PageCache<S, Ser, M>: FromRef<State>,
{
    type Rejection = Infallible;

    async fn from_request_parts(_parts: &mut Parts, state: &State) -> Result<Self, Self::Rejection> {
        Ok(Cache(PageCache::<S, Ser, M>::from_ref(state)))
    }
}

impl<S, Ser, M> std::ops::Deref for Cache<S, Ser, M>
where
    S: KvStore,
    Ser: Serializer,
    M: CacheMetrics,
{
    type Target = PageCache<S, Ser, M>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    #[tokio::test]
    async fn test_cancel_handle_is_shared() {
        let handle = CancelHandle::new();
        let mut parts = Request::get("/").body(()).unwrap().into_parts().0;
        parts.extensions.insert(handle.clone());

        let CacheCancel(extracted) = CacheCancel::from_request_parts(&mut parts, &()).await.unwrap();
        extracted.cancel();
        assert!(handle.is_canceled());
    }

    #[tokio::test]
    async fn test_cancel_without_layer_is_detached() {
        let mut parts = Request::get("/").body(()).unwrap().into_parts().0;
        let cancel = CacheCancel::from_request_parts(&mut parts, &()).await.unwrap();
        cancel.cancel();
        assert!(cancel.is_canceled());
        assert!(parts.extensions.get::<CancelHandle>().is_none());
    }
}
