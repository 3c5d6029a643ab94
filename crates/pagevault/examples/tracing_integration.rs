use http::StatusCode;
use pagevault::TracingMetrics;
use pagevault::prelude::*;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    // 1. Initialize tracing subscriber
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::TRACE) // TRACE shows store latency events
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // 2. Build the cache with the TracingMetrics adapter
    let metrics = TracingMetrics::new().with_service_name("example-service");
    let cache = PageCache::builder(MemoryStore::with_defaults())
        .settings(CacheSettings::builder().always_cache().build())
        .metrics(metrics)
        .build()?;

    for attempt in 1..=2 {
        let request = http::Request::get("http://example.com/").body(())?;
        match cache.dispatch(RequestView::from_request(&request)).await {
            Dispatch::Serve(replay) => println!("attempt {attempt}: {}", replay.status),
            Dispatch::Render(decision) => {
                let rendered = RenderedResponse::new(StatusCode::OK, "<html>home</html>");
                let outcome = cache.capture(decision, rendered).await;
                println!("attempt {attempt}: {}", outcome.status);
            }
        }
    }

    // 3. A bypassed request logs its reason
    let post = http::Request::post("http://example.com/").body(())?;
    if let Dispatch::Render(decision) = cache.dispatch(RequestView::from_request(&post)).await {
        cache
            .capture(decision, RenderedResponse::new(StatusCode::OK, "ok"))
            .await;
    }

    Ok(())
}
