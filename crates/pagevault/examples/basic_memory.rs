//! Basic example: one page through MISS, HIT and a conditional HIT

use pagevault::prelude::*;
use http::StatusCode;

fn view(uri: &str, headers: &[(&str, &str)]) -> std::result::Result<RequestView, http::Error> {
    let mut builder = http::Request::get(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    Ok(RequestView::from_request(&builder.body(())?))
}

async fn serve(
    cache: &PageCache<MemoryStore>,
    request: RequestView,
) -> (StatusCode, String, usize) {
    match cache.dispatch(request).await {
        Dispatch::Serve(replay) => (
            replay.status,
            replay.headers["x-page-cache"].to_str().unwrap_or("?").to_string(),
            replay.body.len(),
        ),
        Dispatch::Render(decision) => {
            // Stand-in for the application handler
            let rendered = RenderedResponse::new(StatusCode::OK, "<html><head></head><body>Hello</body></html>")
                .header("content-type", "text/html")
                .header("etag", "\"hello-v1\"");
            let outcome = cache.capture(decision, rendered).await;
            (
                outcome.response.status(),
                outcome.status.to_string(),
                outcome.response.body().len(),
            )
        }
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    println!("=== pagevault Basic Example ===\n");

    let settings = CacheSettings::builder()
        .max_age(60)
        .always_cache()
        .extra_header("x-served-by", "example")
        .build();
    let cache = PageCache::with_settings(MemoryStore::with_defaults(), settings)?;
    let url = "http://example.com/hello";

    for (label, request) in [
        ("first request", view(url, &[])?),
        ("second request", view(url, &[])?),
        ("revalidation", view(url, &[("if-none-match", "\"hello-v1\"")])?),
        ("logged in", view(url, &[("cookie", "session_id=abc")])?),
    ] {
        let (status, signal, bytes) = serve(&cache, request).await;
        println!("{label:>15}: {status} {signal} ({bytes} bytes)");
    }

    Ok(())
}
