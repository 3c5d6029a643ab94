//! A small site behind the page cache
//!
//! Run with `cargo run -p pagevault-axum --example proper_axum`, then request
//! `/` twice and watch the `x-page-cache` header go from MISS to HIT.

use axum::{Router, extract::FromRef, response::IntoResponse, routing::get};
use pagevault::{CacheSettings, JsonSerializer, MemoryStore, NoopMetrics, PageCache};
use pagevault_axum::{Cache, CacheCancel, PageCacheLayer};
use tokio::net::TcpListener;

type SiteCache = PageCache<MemoryStore, JsonSerializer, NoopMetrics>;

#[derive(Clone)]
struct AppState {
    cache: SiteCache,
}

impl FromRef<AppState> for SiteCache {
    fn from_ref(state: &AppState) -> Self {
        state.cache.clone()
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_target(false).init();

    let settings = CacheSettings::builder()
        .sampling(2, 120)
        .max_age(300)
        .debug_annotations(true)
        .build();
    let cache: SiteCache = PageCache::with_settings(MemoryStore::with_defaults(), settings)?;

    let app = Router::new()
        .route("/", get(home))
        .route("/account", get(account))
        .route("/expire", axum::routing::post(expire))
        .with_state(AppState { cache: cache.clone() })
        .layer(PageCacheLayer::new(cache));

    let listener = TcpListener::bind("127.0.0.1:3000").await?;
    println!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn home() -> impl IntoResponse {
    (
        [("content-type", "text/html; charset=utf-8")],
        "<html><head><title>home</title></head><body>Hello</body></html>",
    )
}

/// Personalised page, never stored
async fn account(cancel: CacheCancel) -> impl IntoResponse {
    cancel.cancel();
    "<html><body>your account</body></html>"
}

/// Bump the document version of the home page
async fn expire(Cache(cache): Cache<MemoryStore, JsonSerializer, NoopMetrics>) -> String {
    match cache.expire_document("127.0.0.1:3000", "/").await {
        Ok(version) => format!("home page now at version {version}"),
        Err(e) => format!("expire failed: {e}"),
    }
}
