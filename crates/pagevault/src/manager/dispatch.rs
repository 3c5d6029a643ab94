//! Request-time decision: serve from the store or render

use bytes::Bytes;
use http::header::{CACHE_CONTROL, CONTENT_LENGTH, LAST_MODIFIED, LOCATION};
use http::{HeaderMap, StatusCode};
use std::time::Instant;
use tracing::{debug, error, instrument};

use pagevault_core::{
    BypassReason, CacheMetrics, CacheStatus, HeaderList, KvStore, PageEntry, Serializer,
};
use pagevault_http::cache_control::CacheControl;
use pagevault_http::response::{
    add_vary_cookie, append_comment, apply_headers, content_type, is_html_document,
    merge_headers, set_header,
};
use pagevault_http::{Replay, RequestView, http_date, is_not_modified, redirect};

use super::PageCache;
use crate::key::CacheKeys;

/// What the host should do with a request
#[derive(Debug)]
pub enum Dispatch {
    /// Answer with this response; origin is not called
    Serve(Replay),
    /// Call origin, then hand the result to [`PageCache::capture`]
    Render(CacheDecision),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// This request holds the lock and its response will be stored
    Regenerate,
    /// The response passes through uncached
    Bypass(BypassReason),
}

/// Per-request state carried from dispatch to capture
///
/// Immutable once built. Capture consumes it, so a decision is settled
/// exactly once.
#[derive(Debug, Clone)]
pub struct CacheDecision {
    pub(super) request: RequestView,
    pub(super) keys: Option<CacheKeys>,
    pub(super) action: Action,
    pub(super) store_down: bool,
    pub(super) document_version: u64,
    pub(super) started_at: u64,
    pub(super) timer: Instant,
    /// The request reached cache lookup
    pub(super) lookup: bool,
}

impl CacheDecision {
    /// Whether capture will try to store the response
    pub fn is_armed(&self) -> bool {
        self.action == Action::Regenerate
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn bypass_reason(&self) -> Option<BypassReason> {
        match self.action {
            Action::Bypass(reason) => Some(reason),
            Action::Regenerate => None,
        }
    }

    /// A store call already failed for this request
    pub fn store_down(&self) -> bool {
        self.store_down
    }

    pub fn keys(&self) -> Option<&CacheKeys> {
        self.keys.as_ref()
    }

    pub fn request(&self) -> &RequestView {
        &self.request
    }
}

impl<S, Ser, M> PageCache<S, Ser, M>
where
    S: KvStore,
    Ser: Serializer,
    M: CacheMetrics,
{
    /// Decide how to answer a request
    ///
    /// Store failures never surface as errors: lookups fail open and the
    /// decision carries `store_down` so the response reports `DOWN`.
    #[instrument(skip_all, fields(host = %request.host, path = %request.path))]
    pub async fn dispatch(&self, request: RequestView) -> Dispatch {
        let started_at = self.now();
        let timer = Instant::now();
        let bypass = |request: RequestView,
                      reason: BypassReason,
                      keys: Option<CacheKeys>,
                      lookup: bool,
                      store_down: bool| {
            Dispatch::Render(CacheDecision {
                request,
                keys,
                action: Action::Bypass(reason),
                store_down,
                document_version: 0,
                started_at,
                timer,
                lookup,
            })
        };

        if let Some(reason) = self.inner.rules.check(&request) {
            debug!(%reason, "request bypasses cache");
            return bypass(request, reason, None, false, false);
        }

        let keys = match self.keys_for(&request) {
            Ok(keys) => keys,
            Err(e) => {
                error!(error = %e, "failed to derive cache key");
                return bypass(request, BypassReason::KeyMismatch, None, false, false);
            }
        };

        let mut down = false;
        let document_version = self.document_version(&keys).await.unwrap_or_else(|_| {
            down = true;
            0
        });
        let entry = self.load_entry(&keys).await.unwrap_or_else(|_| {
            down = true;
            None
        });

        let admission = self
            .inner
            .admission
            .evaluate(&self.inner.store, entry.as_ref(), &keys, document_version, started_at)
            .await;
        down |= admission.store_failed;

        let lock_acquired = if admission.regenerate {
            self.inner
                .lock
                .try_acquire(&self.inner.store, &keys)
                .await
                .unwrap_or_else(|_| {
                    down = true;
                    false
                })
        } else {
            false
        };

        if let Some(entry) = entry {
            let fresh = entry.is_fresh(started_at);
            let use_stale = self.inner.settings.use_stale_while_revalidating;
            if !admission.regenerate || (!lock_acquired && (fresh || use_stale)) {
                debug!(key = %keys.cache_key, fresh, "serving cached page");
                self.inner.metrics.record_outcome(CacheStatus::Hit);
                if !fresh {
                    self.inner.metrics.record_stale_serve();
                }
                return Dispatch::Serve(self.replay(&request, &entry, started_at, timer));
            }
        }

        if lock_acquired {
            debug!(key = %keys.cache_key, "regenerating page");
            return Dispatch::Render(CacheDecision {
                request,
                keys: Some(keys),
                action: Action::Regenerate,
                store_down: down,
                document_version,
                started_at,
                timer,
                lookup: true,
            });
        }

        debug!(key = %keys.cache_key, "regeneration in progress elsewhere");
        bypass(request, BypassReason::LockContention, Some(keys), true, down)
    }

    /// Build the HIT response for a stored entry
    fn replay(&self, request: &RequestView, entry: &PageEntry, now: u64, timer: Instant) -> Replay {
        let settings = &self.inner.settings;
        let mut headers = HeaderMap::new();

        if entry.is_redirect() && settings.cache_redirects {
            apply_headers(&mut headers, &settings.extra_headers);
            if let Some(location) = &entry.redirect_location {
                set_header(&mut headers, LOCATION.as_str(), location);
            }
            add_vary_cookie(&mut headers);
            self.signal(&mut headers, CacheStatus::Hit, None);
            return Replay {
                status: redirect::replay_status(entry.redirect_status),
                version: redirect::replay_version(request.version),
                headers,
                body: Bytes::new(),
            };
        }

        let not_modified = is_not_modified(request, entry, settings.cache_control);

        let merged: HeaderList = merge_headers(&entry.headers, &settings.extra_headers);
        apply_headers(&mut headers, &merged);
        // Freshness comes from the entry, not from the stored origin headers
        if settings.cache_control {
            if !entry.has_header(LAST_MODIFIED.as_str()) {
                set_header(&mut headers, LAST_MODIFIED.as_str(), &http_date(entry.captured_at));
            }
            set_header(
                &mut headers,
                CACHE_CONTROL.as_str(),
                &CacheControl::revalidate_after(entry.remaining(now)),
            );
        }
        // The stored body is trimmed, so the origin length no longer holds
        headers.remove(CONTENT_LENGTH);
        add_vary_cookie(&mut headers);
        self.signal(&mut headers, CacheStatus::Hit, None);

        let status = if not_modified {
            StatusCode::NOT_MODIFIED
        } else {
            StatusCode::from_u16(entry.status).unwrap_or(StatusCode::OK)
        };

        let body = if not_modified || request.is_head() {
            Bytes::new()
        } else if settings.add_debug_annotations
            && is_html_document(content_type(&headers), &entry.body)
        {
            append_comment(
                &entry.body,
                &[
                    format!("generated {} seconds ago", entry.age(now)),
                    format!("generated in {:.3} seconds", entry.generation_secs),
                    format!(
                        "served from cache in {:.3} seconds",
                        timer.elapsed().as_secs_f64()
                    ),
                    format!("expires in {} seconds", entry.remaining(now)),
                ],
            )
        } else {
            Bytes::copy_from_slice(&entry.body)
        };

        Replay {
            status,
            version: request.version,
            headers,
            body,
        }
    }
}
