//! Stored page entry

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Ordered multimap of lowercase header name to values
pub type HeaderList = IndexMap<String, Vec<String>>;

/// A captured response, stored under its cache key
///
/// Entries are written once by response capture and replaced wholesale;
/// they are never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageEntry {
    /// Trimmed response body
    #[serde(with = "serde_bytes")]
    pub body: Vec<u8>,

    /// Unix seconds at which the generating request started
    pub captured_at: u64,

    /// How long origin took to render, in seconds
    pub generation_secs: f64,

    /// Response headers with deny-listed names removed
    pub headers: HeaderList,

    /// Origin status code
    pub status: u16,

    /// Raw status line, when the origin supplied one
    pub status_line: Option<String>,

    /// Redirect status, for redirect entries
    pub redirect_status: Option<u16>,

    /// Redirect target, for redirect entries
    pub redirect_location: Option<String>,

    /// Seconds this entry is considered fresh
    pub max_age: u64,

    /// Operator-controlled format version
    pub schema_version: u64,

    /// Per-document version at capture time
    pub document_version: u64,
}

impl PageEntry {
    /// Unix second at which the entry goes stale
    pub fn expires_at(&self) -> u64 {
        self.captured_at.saturating_add(self.max_age)
    }

    /// True while `now` is before expiry
    pub fn is_fresh(&self, now: u64) -> bool {
        now < self.expires_at()
    }

    /// Unix second at which traffic sampling starts for this entry
    pub fn sampling_starts_at(&self, window: u64) -> u64 {
        self.expires_at().saturating_sub(window)
    }

    /// Seconds of freshness left, floored at zero
    pub fn remaining(&self, now: u64) -> u64 {
        self.expires_at().saturating_sub(now)
    }

    /// Seconds since capture
    pub fn age(&self, now: u64) -> u64 {
        now.saturating_sub(self.captured_at)
    }

    pub fn is_redirect(&self) -> bool {
        self.redirect_location.is_some()
    }

    /// First value of a stored header, matched case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .and_then(|(_, values)| values.first())
            .map(String::as_str)
    }

    /// Whether a header was stored at all
    pub fn has_header(&self, name: &str) -> bool {
        self.headers.keys().any(|k| k.eq_ignore_ascii_case(name))
    }

    /// Size of the stored body in bytes
    pub fn size(&self) -> usize {
        self.body.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> PageEntry {
        let mut headers = HeaderList::new();
        headers.insert("content-type".into(), vec!["text/html".into()]);
        headers.insert("etag".into(), vec!["\"v1\"".into(), "\"v2\"".into()]);
        PageEntry {
            body: b"<html></html>".to_vec(),
            captured_at: 1_000,
            generation_secs: 0.25,
            headers,
            status: 200,
            status_line: None,
            redirect_status: None,
            redirect_location: None,
            max_age: 300,
            schema_version: 1,
            document_version: 0,
        }
    }

    #[test]
    fn test_freshness_boundaries() {
        let e = entry();
        assert_eq!(e.expires_at(), 1_300);
        assert!(e.is_fresh(1_299));
        assert!(!e.is_fresh(1_300));
        assert_eq!(e.remaining(1_100), 200);
        assert_eq!(e.remaining(2_000), 0);
        assert_eq!(e.age(1_100), 100);
    }

    #[test]
    fn test_sampling_start() {
        let e = entry();
        assert_eq!(e.sampling_starts_at(120), 1_180);
        assert_eq!(e.sampling_starts_at(10_000), 0);
    }

    #[test]
    fn test_header_lookup() {
        let e = entry();
        assert_eq!(e.header("ETag"), Some("\"v1\""));
        assert!(e.has_header("Content-Type"));
        assert_eq!(e.header("last-modified"), None);
        assert!(!e.is_redirect());
    }

    #[test]
    fn test_json_roundtrip_keeps_header_order() {
        let e = entry();
        let bytes = serde_json::to_vec(&e).unwrap();
        let back: PageEntry = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, e);
        let names: Vec<_> = back.headers.keys().cloned().collect();
        assert_eq!(names, vec!["content-type", "etag"]);
    }
}
