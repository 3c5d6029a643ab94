//! Read-only snapshot of the parts of a request the cache looks at

use http::header::{AUTHORIZATION, COOKIE, HOST};
use http::{HeaderMap, Method, Uri, Version};

/// The request as seen by the cache
///
/// Built once before rendering and kept unchanged until capture, so the
/// key can be recomputed from exactly the same inputs.
#[derive(Debug, Clone)]
pub struct RequestView {
    pub method: Method,
    /// Lowercased host, including a non-default port when one was given
    pub host: String,
    /// Path with the query string removed
    pub path: String,
    /// Raw query string, without the leading `?`
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub is_secure: bool,
    pub version: Version,
    /// The URI carried `user:pass@`
    pub has_userinfo: bool,
}

impl RequestView {
    /// Snapshot a request
    pub fn from_request<B>(req: &http::Request<B>) -> Self {
        Self::build(req.method(), req.uri(), req.version(), req.headers())
    }

    /// Snapshot request parts
    pub fn from_parts(parts: &http::request::Parts) -> Self {
        Self::build(&parts.method, &parts.uri, parts.version, &parts.headers)
    }

    fn build(method: &Method, uri: &Uri, version: Version, headers: &HeaderMap) -> Self {
        let authority = uri.authority();
        let has_userinfo = authority.is_some_and(|a| a.as_str().contains('@'));

        let host = match authority {
            Some(a) => match a.port_u16() {
                Some(port) => format!("{}:{}", a.host(), port),
                None => a.host().to_string(),
            },
            None => headers
                .get(HOST)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string(),
        }
        .to_ascii_lowercase();

        let forwarded_https = headers
            .get("x-forwarded-proto")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.eq_ignore_ascii_case("https"));
        let is_secure = uri.scheme_str() == Some("https") || forwarded_https;

        let path = match uri.path() {
            "" => "/".to_string(),
            p => p.to_string(),
        };

        Self {
            method: method.clone(),
            host,
            path,
            query: uri.query().map(str::to_string),
            headers: headers.clone(),
            is_secure,
            version,
            has_userinfo,
        }
    }

    /// First value of a header as text
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// All cookies across every `Cookie` header, in order
    pub fn cookies(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| {
                let pair = pair.trim();
                if pair.is_empty() {
                    return None;
                }
                match pair.split_once('=') {
                    Some((name, value)) => Some((name.trim(), value.trim())),
                    None => Some((pair, "")),
                }
            })
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    /// Decoded query parameters in request order
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.query
            .as_deref()
            .map(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .into_owned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The request carries HTTP authentication of any kind
    pub fn has_credentials(&self) -> bool {
        self.has_userinfo || self.headers.contains_key(AUTHORIZATION)
    }

    pub fn is_head(&self) -> bool {
        self.method == Method::HEAD
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(uri: &str, headers: &[(&str, &str)]) -> RequestView {
        let mut builder = http::Request::builder().uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        RequestView::from_request(&builder.body(()).unwrap())
    }

    #[test]
    fn test_absolute_uri() {
        let v = view("https://Example.COM:8443/blog/post?b=2&a=1", &[]);
        assert_eq!(v.host, "example.com:8443");
        assert_eq!(v.path, "/blog/post");
        assert_eq!(v.query.as_deref(), Some("b=2&a=1"));
        assert!(v.is_secure);
        assert!(!v.has_credentials());
    }

    #[test]
    fn test_origin_form_uses_host_header() {
        let v = view("/about", &[("host", "www.example.com")]);
        assert_eq!(v.host, "www.example.com");
        assert!(!v.is_secure);

        let v = view("/about", &[("host", "a.test"), ("x-forwarded-proto", "HTTPS")]);
        assert!(v.is_secure);
    }

    #[test]
    fn test_cookies_across_headers() {
        let v = view(
            "/",
            &[("cookie", "theme=dark; session_id=abc"), ("cookie", "flag")],
        );
        let all: Vec<_> = v.cookies().collect();
        assert_eq!(all, vec![("theme", "dark"), ("session_id", "abc"), ("flag", "")]);
        assert_eq!(v.cookie("session_id"), Some("abc"));
        assert_eq!(v.cookie("missing"), None);
    }

    #[test]
    fn test_query_pairs_decoded() {
        let v = view("http://a.test/s?q=hello+world&tag=a%2Fb&tag=c", &[]);
        assert_eq!(
            v.query_pairs(),
            vec![
                ("q".to_string(), "hello world".to_string()),
                ("tag".to_string(), "a/b".to_string()),
                ("tag".to_string(), "c".to_string()),
            ]
        );
    }

    #[test]
    fn test_credentials() {
        assert!(view("/", &[("authorization", "Basic Zm9vOmJhcg==")]).has_credentials());
        assert!(view("http://user:pw@a.test/", &[]).has_credentials());
    }
}
