//! Request bypass rules and response header filtering

use glob::Pattern;
use http::header::SET_COOKIE;
use http::{HeaderMap, Method};

use pagevault_core::{BypassReason, CacheError, CacheSettings, HeaderList};

use crate::RequestView;

/// Checks that run before any cache I/O
#[derive(Debug, Clone)]
pub struct BypassRules {
    enabled: bool,
    denied_paths: Vec<Pattern>,
    session_prefixes: Vec<String>,
    allowed_prefixes: Vec<String>,
}

impl BypassRules {
    /// Compile rules from settings
    ///
    /// Fails with `CacheError::Config` on an invalid path glob.
    pub fn new(settings: &CacheSettings) -> Result<Self, CacheError> {
        let denied_paths = settings
            .denied_paths
            .iter()
            .map(|glob| {
                Pattern::new(glob)
                    .map_err(|e| CacheError::Config(format!("invalid denied path {glob:?}: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            enabled: settings.is_enabled(),
            denied_paths,
            session_prefixes: settings.session_cookie_prefixes.clone(),
            allowed_prefixes: settings.allowed_cookie_prefixes.clone(),
        })
    }

    /// First rule the request trips, in evaluation order
    pub fn check(&self, request: &RequestView) -> Option<BypassReason> {
        if !self.enabled {
            return Some(BypassReason::Disabled);
        }
        if self.denied_paths.iter().any(|p| p.matches(&request.path)) {
            return Some(BypassReason::FilenameDenylist);
        }
        if request.method != Method::GET && request.method != Method::HEAD {
            return Some(BypassReason::Method);
        }
        if request.has_credentials() {
            return Some(BypassReason::Auth);
        }
        if request.cookies().any(|(name, _)| self.is_session_cookie(name)) {
            return Some(BypassReason::Cookie);
        }
        None
    }

    fn is_session_cookie(&self, name: &str) -> bool {
        self.session_prefixes.iter().any(|p| name.starts_with(p.as_str()))
            && !self.allowed_prefixes.iter().any(|p| name.starts_with(p.as_str()))
    }
}

/// Decides which response headers go into a stored entry
#[derive(Debug, Clone)]
pub struct HeaderFilter {
    uncached: Vec<String>,
}

impl HeaderFilter {
    pub fn new(settings: &CacheSettings) -> Self {
        let mut uncached: Vec<String> = settings
            .uncached_headers
            .iter()
            .map(|h| h.to_ascii_lowercase())
            .collect();
        // Our own status signal is per-response
        uncached.push(settings.status_header.to_ascii_lowercase());
        uncached.push(settings.reason_header.to_ascii_lowercase());
        Self { uncached }
    }

    pub fn is_uncached(&self, name: &str) -> bool {
        self.uncached.iter().any(|h| h.eq_ignore_ascii_case(name))
    }

    /// Storable headers in response order
    ///
    /// Values that are not valid UTF-8 are skipped.
    pub fn collect(&self, headers: &HeaderMap) -> HeaderList {
        let mut list = HeaderList::new();
        for (name, value) in headers {
            if self.is_uncached(name.as_str()) {
                continue;
            }
            if let Ok(value) = value.to_str() {
                list.entry(name.as_str().to_string())
                    .or_default()
                    .push(value.to_string());
            }
        }
        list
    }
}

/// Responses that set cookies are personalized and never stored
pub fn sets_cookie(headers: &HeaderMap) -> bool {
    headers.contains_key(SET_COOKIE)
}
