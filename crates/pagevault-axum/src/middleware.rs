use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::Body;
use bytes::{Bytes, BytesMut};
use futures_util::{StreamExt, stream};
use http::{Request, Response};
use http_body::Body as _;
use pagevault::{Dispatch, PageCache, RenderedResponse};
use pagevault_core::{CacheMetrics, KvStore, Serializer};
use pagevault_http::RequestView;
use tower_service::Service;
use tracing::{Instrument, debug, info_span, warn};

use crate::extractor::CancelHandle;

/// Service produced by [`PageCacheLayer`](crate::PageCacheLayer)
///
/// Hits are answered without calling the inner service. Responses to armed
/// decisions are buffered up to `max_body_bytes` and handed to capture;
/// everything else streams through with bypass headers added.
pub struct PageCacheMiddleware<Svc, S, Ser, M>
where
    S: KvStore,
    Ser: Serializer,
    M: CacheMetrics,
{
    inner: Svc,
    cache: PageCache<S, Ser, M>,
}

impl<Svc, S, Ser, M> PageCacheMiddleware<Svc, S, Ser, M>
where
    S: KvStore,
    Ser: Serializer,
    M: CacheMetrics,
{
    pub fn new(inner: Svc, cache: PageCache<S, Ser, M>) -> Self {
        Self { inner, cache }
    }
}

impl<Svc, S, Ser, M> Clone for PageCacheMiddleware<Svc, S, Ser, M>
where
    Svc: Clone,
    S: KvStore,
    Ser: Serializer,
    M: CacheMetrics,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            cache: self.cache.clone(),
        }
    }
}

impl<Svc, S, Ser, M> Service<Request<Body>> for PageCacheMiddleware<Svc, S, Ser, M>
where
    Svc: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    Svc::Future: Send + 'static,
    Svc::Error: Send,
    S: KvStore,
    Ser: Serializer,
    M: CacheMetrics,
{
    type Response = Response<Body>;
    type Error = Svc::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        // The ready service goes into the future; a fresh clone stays behind
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let cache = self.cache.clone();
        let span = info_span!("page_cache", method = %req.method(), uri = %req.uri());

        Box::pin(
            async move {
                let decision = match cache.dispatch(RequestView::from_request(&req)).await {
                    Dispatch::Serve(replay) => {
                        return Ok::<_, Svc::Error>(replay.into_response::<Body>());
                    }
                    Dispatch::Render(decision) => decision,
                };

                if !decision.is_armed() {
                    let (mut parts, body) = inner.call(req).await?.into_parts();
                    cache.pass(decision, &mut parts.headers).await;
                    return Ok(Response::from_parts(parts, body));
                }

                let handle = CancelHandle::new();
                req.extensions_mut().insert(handle.clone());
                let response = match inner.call(req).await {
                    Ok(response) => response,
                    Err(e) => {
                        cache.abandon(decision).await;
                        return Err(e);
                    }
                };

                let (parts, body) = response.into_parts();
                let limit = cache.settings().max_body_bytes;
                if body.size_hint().lower() > limit as u64 {
                    debug!(limit, "response body too large to cache");
                    cache.abandon(decision).await;
                    return Ok(Response::from_parts(parts, body));
                }
                let mut data = body.into_data_stream();
                let mut buf = BytesMut::new();

                while let Some(chunk) = data.next().await {
                    match chunk {
                        Ok(chunk) if buf.len() + chunk.len() > limit => {
                            debug!(limit, "response body too large to cache");
                            cache.abandon(decision).await;
                            let head =
                                stream::iter([Ok::<Bytes, axum::Error>(buf.freeze()), Ok(chunk)]);
                            let body = Body::from_stream(head.chain(data));
                            return Ok(Response::from_parts(parts, body));
                        }
                        Ok(chunk) => buf.extend_from_slice(&chunk),
                        Err(e) => {
                            warn!(error = %e, "failed to read response body");
                            cache.abandon(decision).await;
                            let head = stream::iter([Ok(buf.freeze()), Err(e)]);
                            return Ok(Response::from_parts(parts, Body::from_stream(head)));
                        }
                    }
                }

                let rendered = RenderedResponse::from_parts(parts, buf.freeze())
                    .canceled(handle.is_canceled());
                let outcome = cache.capture(decision, rendered).await;
                Ok(outcome.response.map(Body::from))
            }
            .instrument(span),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CacheCancel, PageCacheLayer};
    use axum::Router;
    use axum::response::IntoResponse;
    use axum::routing::get;
    use http::{StatusCode, header};
    use pagevault::{CacheSettings, MemoryStore};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    const PAGE: &str = "<html><head></head><body>page</body></html>";

    fn cache(settings: CacheSettings) -> PageCache<MemoryStore> {
        PageCache::with_settings(MemoryStore::with_defaults(), settings).unwrap()
    }

    fn counted(renders: Arc<AtomicUsize>) -> Router {
        Router::new().route(
            "/",
            get(move || {
                let renders = renders.clone();
                async move {
                    renders.fetch_add(1, Ordering::SeqCst);
                    ([(header::CONTENT_TYPE, "text/html")], PAGE)
                }
            }),
        )
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::get(uri)
            .header(header::HOST, "site.test")
            .body(Body::empty())
            .unwrap()
    }

    async fn body_text(response: Response<Body>) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let renders = Arc::new(AtomicUsize::new(0));
        let settings = CacheSettings::builder().always_cache().build();
        let app = counted(renders.clone()).layer(PageCacheLayer::new(cache(settings)));

        let first = app.clone().oneshot(get_request("/")).await.unwrap();
        assert_eq!(first.headers()["x-page-cache"], "MISS");
        assert_eq!(body_text(first).await, PAGE);

        let second = app.oneshot(get_request("/")).await.unwrap();
        assert_eq!(second.status(), StatusCode::OK);
        assert_eq!(second.headers()["x-page-cache"], "HIT");
        assert_eq!(body_text(second).await, PAGE);
        assert_eq!(renders.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_post_streams_through() {
        let app = Router::new()
            .route("/", axum::routing::post(|| async { "posted" }))
            .layer(PageCacheLayer::new(cache(CacheSettings::default())));

        let request = Request::post("/")
            .header(header::HOST, "site.test")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.headers()["x-page-cache"], "BYPASS");
        assert_eq!(response.headers()["x-page-cache-reason"], "method");
        assert_eq!(body_text(response).await, "posted");
    }

    #[tokio::test]
    async fn test_handler_cancel() {
        let renders = Arc::new(AtomicUsize::new(0));
        let counter = renders.clone();
        let app = Router::new()
            .route(
                "/",
                get(move |cancel: CacheCancel| {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        cancel.cancel();
                        PAGE
                    }
                }),
            )
            .layer(PageCacheLayer::new(cache(
                CacheSettings::builder().always_cache().build(),
            )));

        let first = app.clone().oneshot(get_request("/")).await.unwrap();
        assert_eq!(first.headers()["x-page-cache-reason"], "canceled");

        let second = app.oneshot(get_request("/")).await.unwrap();
        assert_ne!(second.headers()["x-page-cache"], "HIT");
        assert_eq!(renders.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_oversized_body_is_not_stored() {
        let renders = Arc::new(AtomicUsize::new(0));
        let settings = CacheSettings::builder()
            .always_cache()
            .max_body_bytes(8)
            .build();
        let pagecache = cache(settings);
        let app = counted(renders.clone()).layer(PageCacheLayer::new(pagecache.clone()));

        let first = app.clone().oneshot(get_request("/")).await.unwrap();
        assert_eq!(body_text(first).await, PAGE);

        let second = app.oneshot(get_request("/")).await.unwrap();
        assert_eq!(body_text(second).await, PAGE);
        assert_eq!(renders.load(Ordering::SeqCst), 2);
        assert_eq!(pagecache.store().len(), 0);
    }

    #[tokio::test]
    async fn test_server_error_not_cached() {
        let app = Router::new()
            .route(
                "/",
                get(|| async { (StatusCode::BAD_GATEWAY, "upstream down").into_response() }),
            )
            .layer(PageCacheLayer::new(cache(
                CacheSettings::builder().always_cache().build(),
            )));

        let response = app.oneshot(get_request("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(response.headers()["x-page-cache-reason"], "bad-status");
        assert_eq!(body_text(response).await, "upstream down");
    }
}
