//! Building the response the cache sends

use bytes::Bytes;
use http::header::{CONTENT_TYPE, VARY};
use http::{HeaderMap, HeaderName, HeaderValue, Response, StatusCode, Version};
use indexmap::IndexMap;

use pagevault_core::HeaderList;

/// A response answered from the cache without calling origin
#[derive(Debug, Clone)]
pub struct Replay {
    pub status: StatusCode,
    pub version: Version,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Replay {
    pub fn into_response<B: From<Bytes>>(self) -> Response<B> {
        let mut response = Response::new(B::from(self.body));
        *response.status_mut() = self.status;
        *response.version_mut() = self.version;
        *response.headers_mut() = self.headers;
        response
    }
}

/// Stored headers followed by static ones, with duplicate values removed
pub fn merge_headers(stored: &HeaderList, extra: &IndexMap<String, Vec<String>>) -> HeaderList {
    let mut merged = HeaderList::new();
    for (name, values) in stored.iter().chain(extra) {
        let slot = merged.entry(name.to_ascii_lowercase()).or_default();
        for value in values {
            if !slot.contains(value) {
                slot.push(value.clone());
            }
        }
    }
    merged
}

/// Write a header list over a map
///
/// Each listed name replaces what the map held; its values are then
/// appended in order. Invalid names or values are skipped.
pub fn apply_headers(map: &mut HeaderMap, list: &HeaderList) {
    for (name, values) in list {
        let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
            continue;
        };
        let mut first = true;
        for value in values {
            let Ok(value) = HeaderValue::from_str(value) else {
                continue;
            };
            if first {
                map.insert(name.clone(), value);
                first = false;
            } else {
                map.append(name.clone(), value);
            }
        }
    }
}

/// Append listed values the map does not already carry
pub fn extend_headers(map: &mut HeaderMap, list: &HeaderList) {
    for (name, values) in list {
        let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
            continue;
        };
        for value in values {
            let Ok(value) = HeaderValue::from_str(value) else {
                continue;
            };
            if !map.get_all(&name).iter().any(|v| *v == value) {
                map.append(name.clone(), value);
            }
        }
    }
}

/// Set a header from text, ignoring values that are not valid header text
pub fn set_header(map: &mut HeaderMap, name: &str, value: &str) {
    if let (Ok(name), Ok(value)) = (
        HeaderName::from_bytes(name.as_bytes()),
        HeaderValue::from_str(value),
    ) {
        map.insert(name, value);
    }
}

/// Add `Vary: Cookie` unless the response already varies on it
pub fn add_vary_cookie(map: &mut HeaderMap) {
    let present = map
        .get_all(VARY)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|v| {
            let v = v.trim();
            v == "*" || v.eq_ignore_ascii_case("cookie")
        });
    if !present {
        map.append(VARY, HeaderValue::from_static("Cookie"));
    }
}

/// Debug comments only go into HTML documents
pub fn is_html_document(content_type: Option<&str>, body: &[u8]) -> bool {
    let html_type = content_type.is_none_or(|ct| ct.trim_start().starts_with("text/html"));
    html_type && contains(body, b"<head")
}

/// Content type of a header map, as text
pub fn content_type(map: &HeaderMap) -> Option<&str> {
    map.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
}

/// Append an HTML comment holding one line per entry
pub fn append_comment(body: &[u8], lines: &[String]) -> Bytes {
    let mut out = Vec::with_capacity(body.len() + 128);
    out.extend_from_slice(body);
    out.extend_from_slice(b"\n<!--\n");
    for line in lines {
        out.push(b'\t');
        out.extend_from_slice(line.as_bytes());
        out.push(b'\n');
    }
    out.extend_from_slice(b"-->\n");
    Bytes::from(out)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
