//! Conditional request handling against a stored entry

use chrono::{DateTime, NaiveDateTime, Utc};
use http::header::{IF_MODIFIED_SINCE, IF_NONE_MATCH};

use pagevault_core::PageEntry;

use crate::RequestView;

const IMF_FIXDATE: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Format unix seconds as an HTTP date
pub fn http_date(unix: u64) -> String {
    i64::try_from(unix)
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .unwrap_or_default()
        .format(IMF_FIXDATE)
        .to_string()
}

/// Parse an HTTP date in any of the three formats RFC 9110 allows
pub fn parse_http_date(value: &str) -> Option<u64> {
    let value = value.trim();
    let secs = DateTime::parse_from_rfc2822(value)
        .map(|dt| dt.timestamp())
        .or_else(|_| {
            NaiveDateTime::parse_from_str(value, "%A, %d-%b-%y %H:%M:%S GMT")
                .map(|dt| dt.and_utc().timestamp())
        })
        .or_else(|_| {
            NaiveDateTime::parse_from_str(value, "%a %b %e %H:%M:%S %Y")
                .map(|dt| dt.and_utc().timestamp())
        })
        .ok()?;
    u64::try_from(secs).ok()
}

/// Whether a hit can be answered with `304 Not Modified`
///
/// An exact `If-None-Match` match against the first stored `ETag` wins.
/// Otherwise, when `check_dates` is set, `If-Modified-Since` is compared
/// with the stored `Last-Modified`, or the capture time when none was
/// stored or it does not parse.
pub fn is_not_modified(request: &RequestView, entry: &PageEntry, check_dates: bool) -> bool {
    if let (Some(client), Some(stored)) = (
        request.header(IF_NONE_MATCH.as_str()),
        entry.header("etag"),
    ) {
        if client == stored {
            return true;
        }
    }

    if !check_dates {
        return false;
    }

    let Some(client_time) = request
        .header(IF_MODIFIED_SINCE.as_str())
        .and_then(parse_http_date)
    else {
        return false;
    };

    let cache_time = entry
        .header("last-modified")
        .and_then(parse_http_date)
        .unwrap_or(entry.captured_at);

    client_time >= cache_time
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagevault_core::HeaderList;

    fn entry(headers: &[(&str, &str)]) -> PageEntry {
        let mut list = HeaderList::new();
        for (k, v) in headers {
            list.entry(k.to_string()).or_default().push(v.to_string());
        }
        PageEntry {
            body: b"body".to_vec(),
            captured_at: 784_111_777, // Sun, 06 Nov 1994 08:49:37 GMT
            generation_secs: 0.1,
            headers: list,
            status: 200,
            status_line: None,
            redirect_status: None,
            redirect_location: None,
            max_age: 300,
            schema_version: 1,
            document_version: 0,
        }
    }

    fn request(headers: &[(&str, &str)]) -> RequestView {
        let mut builder = http::Request::builder().uri("http://a.test/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        RequestView::from_request(&builder.body(()).unwrap())
    }

    #[test]
    fn test_http_date_roundtrip() {
        assert_eq!(http_date(784_111_777), "Sun, 06 Nov 1994 08:49:37 GMT");
        assert_eq!(parse_http_date("Sun, 06 Nov 1994 08:49:37 GMT"), Some(784_111_777));
        assert_eq!(parse_http_date("Sunday, 06-Nov-94 08:49:37 GMT"), Some(784_111_777));
        assert_eq!(parse_http_date("yesterday"), None);
    }

    #[test]
    fn test_etag_match() {
        let e = entry(&[("etag", "\"v1\"")]);
        assert!(is_not_modified(&request(&[("if-none-match", "\"v1\"")]), &e, false));
        assert!(!is_not_modified(&request(&[("if-none-match", "\"v2\"")]), &e, true));
    }

    #[test]
    fn test_if_modified_since_against_capture_time() {
        let e = entry(&[]);
        let same = request(&[("if-modified-since", "Sun, 06 Nov 1994 08:49:37 GMT")]);
        let earlier = request(&[("if-modified-since", "Sun, 06 Nov 1994 08:49:36 GMT")]);
        assert!(is_not_modified(&same, &e, true));
        assert!(!is_not_modified(&earlier, &e, true));
        // Date checks follow the freshness-header switch
        assert!(!is_not_modified(&same, &e, false));
    }

    #[test]
    fn test_if_modified_since_against_stored_last_modified() {
        let e = entry(&[("last-modified", "Mon, 07 Nov 1994 00:00:00 GMT")]);
        let before = request(&[("if-modified-since", "Sun, 06 Nov 1994 08:49:37 GMT")]);
        let after = request(&[("if-modified-since", "Tue, 08 Nov 1994 00:00:00 GMT")]);
        assert!(!is_not_modified(&before, &e, true));
        assert!(is_not_modified(&after, &e, true));
    }

    #[test]
    fn test_unparsable_client_date() {
        let e = entry(&[]);
        assert!(!is_not_modified(&request(&[("if-modified-since", "garbage")]), &e, true));
    }
}
