//! Redis-backed page cache shared by several processes
//!
//! Run with `cargo run --example redis_backend --features redis` against a
//! local Redis on the default port.

use http::StatusCode;
use pagevault::prelude::*;
use pagevault::{GuardedStore, RedisConfig, RedisStore};

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let config = RedisConfig::new("redis://127.0.0.1:6379").pool_size(8);
    let store = GuardedStore::with_defaults(RedisStore::new(config).await?);

    let settings = pagevault::load_settings(None)?;
    let cache = PageCache::with_settings(store, settings)?;

    let request = http::Request::get("http://example.com/news").body(())?;
    let view = RequestView::from_request(&request);

    match cache.dispatch(view).await {
        Dispatch::Serve(replay) => println!("HIT {} ({} bytes)", replay.status, replay.body.len()),
        Dispatch::Render(decision) => {
            let rendered = RenderedResponse::new(StatusCode::OK, "<html><head></head>news</html>");
            let outcome = cache.capture(decision, rendered).await;
            println!("{} (stored: {})", outcome.status, outcome.stored);
        }
    }

    let version = cache.expire_document("example.com", "/news").await?;
    println!("document version is now {version}");

    Ok(())
}
