//! Cache settings and builder

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::CacheError;

/// Operator configuration for the page cache
///
/// Settings are immutable once a cache is built from them. Every field has
/// a default, so a partial TOML file or an empty environment is enough.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Seconds a captured page stays fresh; `0` disables caching
    pub max_age: u64,
    /// Hits inside the sampling window needed before a stale page is regenerated
    pub min_hits_before_cache: u64,
    /// Seconds before expiry during which hits are counted
    pub sampling_window: u64,
    /// Extra seconds entries stay in the store past the sampling window
    pub safety_margin: u64,
    /// Seconds a regeneration lock lives if never released
    pub lock_ttl: u64,
    /// Upper bound for each store call, in milliseconds
    pub store_timeout_ms: u64,
    /// Serve stale pages while another request regenerates
    pub use_stale_while_revalidating: bool,
    /// Store redirect responses
    pub cache_redirects: bool,
    /// Query parameters dropped from the cache identity
    pub ignored_query_params: Vec<String>,
    /// Response headers never written to the store
    pub uncached_headers: Vec<String>,
    /// Cookie name prefixes that mark a personalized request
    pub session_cookie_prefixes: Vec<String>,
    /// Cookie name prefixes exempt from the session check
    pub allowed_cookie_prefixes: Vec<String>,
    /// Path globs that are never cached
    pub denied_paths: Vec<String>,
    /// Request headers that split the cache
    pub unique_headers: Vec<String>,
    /// Request cookies that split the cache
    pub unique_cookies: Vec<String>,
    /// Emit the status and reason headers
    pub add_status_header: bool,
    pub status_header: String,
    pub reason_header: String,
    /// Emit `Last-Modified`, `Cache-Control` and answer conditional requests by date
    pub cache_control: bool,
    /// Append an HTML comment with timing details to HTML pages
    pub add_debug_annotations: bool,
    /// Bump to invalidate every stored entry
    pub schema_version: u64,
    /// Store namespace
    pub group: String,
    /// Headers added to every cached and replayed response
    pub extra_headers: IndexMap<String, Vec<String>>,
    /// Largest body the capture stage buffers
    pub max_body_bytes: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_age: 300,
            min_hits_before_cache: 2,
            sampling_window: 120,
            safety_margin: 30,
            lock_ttl: 10,
            store_timeout_ms: 1_000,
            use_stale_while_revalidating: true,
            cache_redirects: false,
            ignored_query_params: Vec::new(),
            uncached_headers: vec!["transfer-encoding".to_string()],
            session_cookie_prefixes: vec![
                "session".to_string(),
                "logged_in".to_string(),
                "comment_author".to_string(),
            ],
            allowed_cookie_prefixes: Vec::new(),
            denied_paths: vec![
                "/admin*".to_string(),
                "/api/*".to_string(),
                "/cron*".to_string(),
            ],
            unique_headers: Vec::new(),
            unique_cookies: Vec::new(),
            add_status_header: true,
            status_header: "x-page-cache".to_string(),
            reason_header: "x-page-cache-reason".to_string(),
            cache_control: true,
            add_debug_annotations: false,
            schema_version: 1,
            group: "pagecache".to_string(),
            extra_headers: IndexMap::new(),
            max_body_bytes: 8 * 1024 * 1024,
        }
    }
}

impl CacheSettings {
    /// Start a builder from the defaults
    pub fn builder() -> SettingsBuilder {
        SettingsBuilder::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.max_age > 0
    }

    /// Whether the hit-sampling heuristic is active
    pub fn samples_traffic(&self) -> bool {
        self.min_hits_before_cache >= 2 && self.sampling_window > 0
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl)
    }

    /// Store TTL for an entry that is fresh for `max_age` seconds
    pub fn entry_ttl(&self, max_age: u64) -> Duration {
        Duration::from_secs(
            max_age
                .saturating_add(self.sampling_window)
                .saturating_add(self.safety_margin),
        )
    }

    /// Reject values no cache can run with
    pub fn validate(&self) -> Result<(), CacheError> {
        if self.store_timeout_ms == 0 {
            return Err(CacheError::Config("store_timeout_ms must be positive".into()));
        }
        if self.lock_ttl == 0 {
            return Err(CacheError::Config("lock_ttl must be positive".into()));
        }
        if self.group.is_empty() {
            return Err(CacheError::Config("group must not be empty".into()));
        }
        for name in [&self.status_header, &self.reason_header] {
            if !is_header_token(name) {
                return Err(CacheError::Config(format!("invalid header name {name:?}")));
            }
        }
        for name in self.extra_headers.keys().chain(&self.unique_headers) {
            if !is_header_token(name) {
                return Err(CacheError::Config(format!("invalid header name {name:?}")));
            }
        }
        if self.unique_cookies.iter().any(String::is_empty) {
            return Err(CacheError::Config("unique_cookies entries must not be empty".into()));
        }
        Ok(())
    }
}

fn is_header_token(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b))
}

/// Fluent builder for [`CacheSettings`]
#[derive(Debug, Clone, Default)]
pub struct SettingsBuilder(CacheSettings);

impl SettingsBuilder {
    pub fn max_age(mut self, secs: u64) -> Self {
        self.0.max_age = secs;
        self
    }

    /// Set the hit threshold and the window it is counted in
    pub fn sampling(mut self, min_hits: u64, window_secs: u64) -> Self {
        self.0.min_hits_before_cache = min_hits;
        self.0.sampling_window = window_secs;
        self
    }

    /// Cache on first sight and regenerate whenever stale
    pub fn always_cache(self) -> Self {
        self.sampling(0, 0)
    }

    pub fn safety_margin(mut self, secs: u64) -> Self {
        self.0.safety_margin = secs;
        self
    }

    pub fn lock_ttl(mut self, secs: u64) -> Self {
        self.0.lock_ttl = secs;
        self
    }

    pub fn store_timeout(mut self, timeout: Duration) -> Self {
        self.0.store_timeout_ms = timeout.as_millis().max(1) as u64;
        self
    }

    pub fn stale_while_revalidating(mut self, enabled: bool) -> Self {
        self.0.use_stale_while_revalidating = enabled;
        self
    }

    pub fn cache_redirects(mut self, enabled: bool) -> Self {
        self.0.cache_redirects = enabled;
        self
    }

    pub fn ignore_query_param(mut self, name: impl Into<String>) -> Self {
        self.0.ignored_query_params.push(name.into());
        self
    }

    pub fn uncached_header(mut self, name: impl Into<String>) -> Self {
        self.0.uncached_headers.push(name.into());
        self
    }

    pub fn allow_cookie_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.0.allowed_cookie_prefixes.push(prefix.into());
        self
    }

    /// Replace the path deny-list
    pub fn denied_paths<I, S>(mut self, globs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0.denied_paths = globs.into_iter().map(Into::into).collect();
        self
    }

    pub fn unique_header(mut self, name: impl Into<String>) -> Self {
        self.0.unique_headers.push(name.into());
        self
    }

    pub fn unique_cookie(mut self, name: impl Into<String>) -> Self {
        self.0.unique_cookies.push(name.into());
        self
    }

    pub fn status_header(mut self, enabled: bool) -> Self {
        self.0.add_status_header = enabled;
        self
    }

    pub fn cache_control(mut self, enabled: bool) -> Self {
        self.0.cache_control = enabled;
        self
    }

    pub fn debug_annotations(mut self, enabled: bool) -> Self {
        self.0.add_debug_annotations = enabled;
        self
    }

    pub fn schema_version(mut self, version: u64) -> Self {
        self.0.schema_version = version;
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.0.group = group.into();
        self
    }

    /// Add a static header to every cached response
    pub fn extra_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0
            .extra_headers
            .entry(name.into().to_ascii_lowercase())
            .or_default()
            .push(value.into());
        self
    }

    pub fn max_body_bytes(mut self, bytes: usize) -> Self {
        self.0.max_body_bytes = bytes;
        self
    }

    pub fn build(self) -> CacheSettings {
        self.0
    }
}
