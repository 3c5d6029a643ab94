//! Response-time capture: store what origin rendered

use bytes::Bytes;
use http::header::{CACHE_CONTROL, CONTENT_LENGTH, LAST_MODIFIED, LOCATION};
use http::{HeaderMap, HeaderValue, Response, StatusCode, Version};
use tracing::{debug, error, instrument, warn};

use pagevault_core::{
    BypassReason, CacheMetrics, CacheStatus, KvStore, PageEntry, Serializer,
};
use pagevault_http::cache_control::{CacheControl, origin_max_age};
use pagevault_http::policy::sets_cookie;
use pagevault_http::response::{
    add_vary_cookie, append_comment, content_type, extend_headers, is_html_document,
};
use pagevault_http::{NO_CACHE, http_date, redirect};

use super::{Action, CacheDecision, PageCache};

/// A fully buffered origin response
#[derive(Debug, Clone)]
pub struct RenderedResponse {
    pub status: StatusCode,
    pub version: Version,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// The application asked for this response not to be cached
    pub canceled: bool,
}

impl RenderedResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            body: body.into(),
            canceled: false,
        }
    }

    pub fn from_parts(parts: http::response::Parts, body: Bytes) -> Self {
        Self {
            status: parts.status,
            version: parts.version,
            headers: parts.headers,
            body,
            canceled: false,
        }
    }

    /// Add a header; invalid text is ignored
    pub fn header(mut self, name: &'static str, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.append(name, value);
        }
        self
    }

    pub fn canceled(mut self, canceled: bool) -> Self {
        self.canceled = canceled;
        self
    }
}

/// The response to send, and what capture did with it
#[derive(Debug)]
pub struct CaptureOutcome {
    pub response: Response<Bytes>,
    pub status: CacheStatus,
    pub reason: Option<BypassReason>,
    /// An entry was written to the store
    pub stored: bool,
}

impl<S, Ser, M> PageCache<S, Ser, M>
where
    S: KvStore,
    Ser: Serializer,
    M: CacheMetrics,
{
    /// Settle a rendered response against its decision
    ///
    /// Armed decisions try to store the response and always release the
    /// regeneration lock. Disarmed ones only get their bypass headers.
    #[instrument(skip_all, fields(host = %decision.request.host, path = %decision.request.path))]
    pub async fn capture(&self, decision: CacheDecision, rendered: RenderedResponse) -> CaptureOutcome {
        if let Action::Bypass(reason) = decision.action {
            return self.pass_through(&decision, rendered, reason, decision.store_down);
        }
        let Some(keys) = decision.keys.clone() else {
            return self.pass_through(&decision, rendered, BypassReason::KeyMismatch, decision.store_down);
        };

        let settings = &self.inner.settings;
        let store = &self.inner.store;
        let mut down = decision.store_down;

        let location = rendered
            .headers
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let stores_redirect =
            settings.cache_redirects && redirect::is_redirect(rendered.status, location.as_deref());
        let trimmed = rendered.body.trim_ascii();

        let rejection = if rendered.canceled {
            Some(BypassReason::Canceled)
        } else if trimmed.is_empty() && !stores_redirect {
            Some(BypassReason::NoContent)
        } else if rendered.status.is_server_error() {
            Some(BypassReason::BadStatus)
        } else if !self.key_unchanged(&decision, &keys.cache_key) {
            Some(BypassReason::KeyMismatch)
        } else if sets_cookie(&rendered.headers) {
            Some(BypassReason::SetCookie)
        } else {
            None
        };

        if let Some(reason) = rejection {
            if !self.inner.lock.release(store, &keys).await {
                down = true;
            }
            return self.pass_through(&decision, rendered, reason, down);
        }

        let max_age = origin_max_age(
            rendered
                .headers
                .get_all(CACHE_CONTROL)
                .iter()
                .filter_map(|v| v.to_str().ok()),
        )
        .unwrap_or(settings.max_age);
        let generation = decision.timer.elapsed();

        let entry = PageEntry {
            body: trimmed.to_vec(),
            captured_at: decision.started_at,
            generation_secs: generation.as_secs_f64(),
            headers: self.inner.headers.collect(&rendered.headers),
            status: rendered.status.as_u16(),
            status_line: Some(format!("{:?} {}", rendered.version, rendered.status)),
            redirect_status: stores_redirect.then(|| rendered.status.as_u16()),
            redirect_location: if stores_redirect { location } else { None },
            max_age,
            schema_version: settings.schema_version,
            document_version: decision.document_version,
        };

        let stored = match self.inner.codec.encode(&entry) {
            Ok(bytes) => match store.set(&keys.entry, bytes, settings.entry_ttl(max_age)).await {
                Ok(()) => true,
                Err(_) => {
                    down = true;
                    false
                }
            },
            Err(e) => {
                warn!(key = %keys.cache_key, error = %e, "failed to encode entry");
                false
            }
        };
        if !self.inner.lock.release(store, &keys).await {
            down = true;
        }

        let status = CacheStatus::Miss.with_store_down(down);
        let mut headers = rendered.headers;
        if settings.cache_control {
            if !headers.contains_key(LAST_MODIFIED) {
                if let Ok(value) = HeaderValue::from_str(&http_date(decision.started_at)) {
                    headers.insert(LAST_MODIFIED, value);
                }
            }
            if !headers.contains_key(CACHE_CONTROL) {
                if let Ok(value) = HeaderValue::from_str(&CacheControl::revalidate_after(max_age)) {
                    headers.insert(CACHE_CONTROL, value);
                }
            }
        }
        extend_headers(&mut headers, &settings.extra_headers);
        add_vary_cookie(&mut headers);
        self.signal(&mut headers, status, None);

        let mut body = rendered.body;
        if stored
            && settings.add_debug_annotations
            && is_html_document(content_type(&headers), &body)
        {
            body = append_comment(
                &body,
                &[
                    format!("generated in {:.3} seconds", generation.as_secs_f64()),
                    format!("{} bytes cached for {} seconds", entry.size(), max_age),
                ],
            );
            headers.remove(CONTENT_LENGTH);
        }

        self.inner.metrics.record_outcome(status);
        if stored {
            self.inner.metrics.record_regeneration(generation);
        }
        debug!(key = %keys.cache_key, %status, stored, max_age, "captured response");

        let mut response = Response::new(body);
        *response.status_mut() = rendered.status;
        *response.version_mut() = rendered.version;
        *response.headers_mut() = headers;
        CaptureOutcome {
            response,
            status,
            reason: None,
            stored,
        }
    }

    /// Give up on a decision whose render never produced a response
    ///
    /// Releases the lock of an armed decision. Nothing is stored.
    pub async fn abandon(&self, decision: CacheDecision) {
        if let (Action::Regenerate, Some(keys)) = (decision.action, &decision.keys) {
            debug!(key = %keys.cache_key, "abandoning regeneration");
            self.inner.lock.release(&self.inner.store, keys).await;
        }
    }

    fn key_unchanged(&self, decision: &CacheDecision, dispatched: &str) -> bool {
        match self.keys_for(&decision.request) {
            Ok(keys) if keys.cache_key == dispatched => true,
            Ok(keys) => {
                error!(
                    dispatched,
                    captured = %keys.cache_key,
                    "cache key changed while rendering; variant dimensions must be pure"
                );
                false
            }
            Err(e) => {
                error!(dispatched, error = %e, "failed to recompute cache key");
                false
            }
        }
    }

    /// Apply bypass headers to a response that is not buffered
    ///
    /// For disarmed decisions, where the body never needs to be read. An
    /// armed decision handed here is abandoned.
    pub async fn pass(&self, decision: CacheDecision, headers: &mut HeaderMap) -> CacheStatus {
        match decision.action {
            Action::Bypass(reason) => {
                self.mark_bypass(headers, reason, decision.store_down, decision.lookup)
            }
            Action::Regenerate => {
                self.abandon(decision).await;
                CacheStatus::Bypass
            }
        }
    }

    fn pass_through(
        &self,
        decision: &CacheDecision,
        rendered: RenderedResponse,
        reason: BypassReason,
        down: bool,
    ) -> CaptureOutcome {
        let mut headers = rendered.headers;
        let status = self.mark_bypass(&mut headers, reason, down, decision.lookup);

        let mut response = Response::new(rendered.body);
        *response.status_mut() = rendered.status;
        *response.version_mut() = rendered.version;
        *response.headers_mut() = headers;
        CaptureOutcome {
            response,
            status,
            reason: Some(reason),
            stored: false,
        }
    }

    fn mark_bypass(
        &self,
        headers: &mut HeaderMap,
        reason: BypassReason,
        down: bool,
        lookup: bool,
    ) -> CacheStatus {
        let status = CacheStatus::Bypass.with_store_down(down);
        if self.inner.settings.cache_control && reason.sends_no_cache() {
            headers.insert(CACHE_CONTROL, HeaderValue::from_static(NO_CACHE));
        }
        if lookup {
            add_vary_cookie(headers);
        }
        self.signal(headers, status, Some(reason));

        self.inner.metrics.record_outcome(status);
        self.inner.metrics.record_bypass(reason);
        debug!(%status, %reason, "response not cached");
        status
    }
}
