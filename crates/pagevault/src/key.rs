//! Cache key derivation
//!
//! A request maps to a [`CacheIdentity`], which hashes to a url key (what
//! was asked for) and a cache key (what was asked for, plus the value of
//! every registered variant dimension). Both are SHA-256 hex digests of a
//! canonical JSON encoding, so they are stable across processes.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use pagevault_core::{CacheError, CacheSettings, Result};
use pagevault_http::RequestView;

/// Output of a variant dimension
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(untagged)]
pub enum VariantValue {
    None,
    Bool(bool),
    Int(i64),
    Text(String),
}

impl From<bool> for VariantValue {
    fn from(v: bool) -> Self {
        VariantValue::Bool(v)
    }
}

impl From<i64> for VariantValue {
    fn from(v: i64) -> Self {
        VariantValue::Int(v)
    }
}

impl From<&str> for VariantValue {
    fn from(v: &str) -> Self {
        VariantValue::Text(v.to_string())
    }
}

impl From<String> for VariantValue {
    fn from(v: String) -> Self {
        VariantValue::Text(v)
    }
}

impl<T: Into<VariantValue>> From<Option<T>> for VariantValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(VariantValue::None, Into::into)
    }
}

type Evaluator = Arc<dyn Fn(&RequestView) -> VariantValue + Send + Sync>;

const RESERVED: &[&str] = &["host", "method", "path", "query", "is_secure", "url_key"];

/// Named dimensions that split one URL into several cached pages
///
/// Evaluators must be pure functions of the request: the key is derived
/// once before rendering and again at capture, and any difference aborts
/// the write.
#[derive(Clone, Default)]
pub struct VariantRegistry {
    dimensions: BTreeMap<String, Evaluator>,
}

impl VariantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dimension
    ///
    /// Names must be non-empty, free of `:`, unused, and not one of the
    /// identity fields.
    pub fn register<F>(&mut self, name: impl Into<String>, evaluator: F) -> Result<()>
    where
        F: Fn(&RequestView) -> VariantValue + Send + Sync + 'static,
    {
        let name = name.into();
        let reject = |reason: &str| CacheError::InvalidVariant {
            name: name.clone(),
            reason: reason.to_string(),
        };
        if name.is_empty() {
            return Err(reject("name is empty"));
        }
        if name.contains(':') {
            return Err(reject("name contains ':'"));
        }
        if RESERVED.contains(&name.as_str()) {
            return Err(reject("name is reserved"));
        }
        self.insert(name, Arc::new(evaluator))
    }

    /// Add the `header:` and `cookie:` dimensions named in settings
    pub fn with_settings(mut self, settings: &CacheSettings) -> Result<Self> {
        for header in &settings.unique_headers {
            let header = header.to_ascii_lowercase();
            let lookup = header.clone();
            self.insert(
                format!("header:{header}"),
                Arc::new(move |req: &RequestView| -> VariantValue { req.header(&lookup).into() }),
            )?;
        }
        for cookie in &settings.unique_cookies {
            let lookup = cookie.clone();
            self.insert(
                format!("cookie:{cookie}"),
                Arc::new(move |req: &RequestView| -> VariantValue { req.cookie(&lookup).into() }),
            )?;
        }
        Ok(self)
    }

    fn insert(&mut self, name: String, evaluator: Evaluator) -> Result<()> {
        if self.dimensions.contains_key(&name) {
            return Err(CacheError::InvalidVariant {
                name,
                reason: "already registered".into(),
            });
        }
        self.dimensions.insert(name, evaluator);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.dimensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dimensions.is_empty()
    }

    /// Evaluate every dimension in name order
    pub fn evaluate(&self, request: &RequestView) -> BTreeMap<String, VariantValue> {
        self.dimensions
            .iter()
            .map(|(name, eval)| (name.clone(), eval(request)))
            .collect()
    }
}

impl fmt::Debug for VariantRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.dimensions.keys()).finish()
    }
}

/// Everything that distinguishes one cached page from another
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheIdentity {
    pub host: String,
    pub method: String,
    pub path: String,
    pub query: BTreeMap<String, Vec<String>>,
    pub variants: BTreeMap<String, VariantValue>,
    pub is_secure: bool,
}

#[derive(Serialize)]
struct UrlFields<'a> {
    host: &'a str,
    method: &'a str,
    path: &'a str,
    query: &'a BTreeMap<String, Vec<String>>,
    is_secure: bool,
}

#[derive(Serialize)]
struct KeyFields<'a> {
    url_key: &'a str,
    variants: &'a BTreeMap<String, VariantValue>,
}

#[derive(Serialize)]
struct DocumentFields<'a> {
    host: &'a str,
    path: &'a str,
}

impl CacheIdentity {
    pub fn url_key(&self) -> Result<String> {
        digest(&UrlFields {
            host: &self.host,
            method: &self.method,
            path: &self.path,
            query: &self.query,
            is_secure: self.is_secure,
        })
    }

    pub fn cache_key(&self) -> Result<String> {
        self.cache_key_for(&self.url_key()?)
    }

    fn cache_key_for(&self, url_key: &str) -> Result<String> {
        digest(&KeyFields {
            url_key,
            variants: &self.variants,
        })
    }
}

/// Store keys for one page, already namespaced by group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKeys {
    pub url_key: String,
    pub cache_key: String,
    /// Where the entry lives
    pub entry: String,
    /// Hit counter for traffic sampling
    pub counter: String,
    /// Regeneration lock
    pub lock: String,
    /// Per-document version, in unix seconds
    pub document_version: String,
}

/// Derives identities and store keys from requests
#[derive(Debug, Clone)]
pub struct KeyBuilder {
    group: String,
    ignored_query_params: Vec<String>,
    variants: VariantRegistry,
}

impl KeyBuilder {
    pub fn new(settings: &CacheSettings, variants: VariantRegistry) -> Self {
        Self {
            group: settings.group.clone(),
            ignored_query_params: settings.ignored_query_params.clone(),
            variants,
        }
    }

    pub fn variants(&self) -> &VariantRegistry {
        &self.variants
    }

    pub fn identity(&self, request: &RequestView) -> CacheIdentity {
        let mut query: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, value) in request.query_pairs() {
            if self.ignored_query_params.iter().any(|p| *p == name) {
                continue;
            }
            query.entry(name).or_default().push(value);
        }

        CacheIdentity {
            host: request.host.clone(),
            method: request.method.as_str().to_string(),
            path: request.path.clone(),
            query,
            variants: self.variants.evaluate(request),
            is_secure: request.is_secure,
        }
    }

    pub fn keys(&self, identity: &CacheIdentity) -> Result<CacheKeys> {
        let url_key = identity.url_key()?;
        let cache_key = identity.cache_key_for(&url_key)?;
        let entry = format!("{}:{}", self.group, cache_key);
        Ok(CacheKeys {
            counter: format!("{entry}:reqs"),
            lock: format!("{entry}:genlock"),
            document_version: self.document_version_key(&identity.host, &identity.path)?,
            url_key,
            cache_key,
            entry,
        })
    }

    /// Version counter shared by every variant and query of one document
    pub fn document_version_key(&self, host: &str, path: &str) -> Result<String> {
        let document_key = digest(&DocumentFields { host, path })?;
        Ok(format!("{}:{}:version", self.group, document_key))
    }
}

fn digest<T: Serialize>(fields: &T) -> Result<String> {
    let encoded = serde_json::to_vec(fields).map_err(|e| CacheError::Serialization(e.to_string()))?;
    Ok(hex::encode(Sha256::digest(&encoded)))
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

    fn builder() -> KeyBuilder {
        KeyBuilder::new(&CacheSettings::default(), VariantRegistry::new())
    }

    #[test]
    fn test_key_determinism_and_query_order() {
        let b = builder();
        let a = b.keys(&b.identity(&view("http://a.test/p?x=1&y=2", &[]))).unwrap();
        let c = b.keys(&b.identity(&view("http://a.test/p?y=2&x=1", &[]))).unwrap();
        assert_eq!(a, c);
        assert_eq!(a.cache_key.len(), 64);
        assert_eq!(a.entry, format!("pagecache:{}", a.cache_key));
        assert_eq!(a.counter, format!("pagecache:{}:reqs", a.cache_key));
        assert_eq!(a.lock, format!("pagecache:{}:genlock", a.cache_key));
    }

    #[test]
    fn test_identity_fields_change_key() {
        let b = builder();
        let key = |uri: &str| b.keys(&b.identity(&view(uri, &[]))).unwrap().cache_key;
        let base = key("http://a.test/p");
        assert_ne!(base, key("https://a.test/p"));
        assert_ne!(base, key("http://b.test/p"));
        assert_ne!(base, key("http://a.test/q"));
        assert_ne!(base, key("http://a.test/p?x=1"));
    }

    #[test]
    fn test_ignored_query_params() {
        let settings = CacheSettings::builder().ignore_query_param("utm_source").build();
        let b = KeyBuilder::new(&settings, VariantRegistry::new());
        let plain = b.identity(&view("http://a.test/p?id=3", &[]));
        let tracked = b.identity(&view("http://a.test/p?utm_source=mail&id=3", &[]));
        assert_eq!(plain, tracked);
    }

    #[test]
    fn test_variant_changes_cache_key_only() {
        let mut registry = VariantRegistry::new();
        registry
            .register("mobile", |req: &RequestView| {
                req.header("user-agent")
                    .is_some_and(|ua| ua.contains("Mobile"))
                    .into()
            })
            .unwrap();
        let b = KeyBuilder::new(&CacheSettings::default(), registry);

        let desktop = b.keys(&b.identity(&view("http://a.test/", &[("user-agent", "Desk")]))).unwrap();
        let mobile = b.keys(&b.identity(&view("http://a.test/", &[("user-agent", "Mobile")]))).unwrap();
        assert_eq!(desktop.url_key, mobile.url_key);
        assert_ne!(desktop.cache_key, mobile.cache_key);
        assert_eq!(desktop.document_version, mobile.document_version);
    }

    #[test]
    fn test_registration_order_irrelevant() {
        let mut first = VariantRegistry::new();
        first.register("b", |_: &RequestView| VariantValue::Int(2)).unwrap();
        first.register("a", |_: &RequestView| VariantValue::Int(1)).unwrap();
        let mut second = VariantRegistry::new();
        second.register("a", |_: &RequestView| VariantValue::Int(1)).unwrap();
        second.register("b", |_: &RequestView| VariantValue::Int(2)).unwrap();

        let settings = CacheSettings::default();
        let req = view("http://a.test/", &[]);
        let k1 = KeyBuilder::new(&settings, first);
        let k2 = KeyBuilder::new(&settings, second);
        assert_eq!(
            k1.keys(&k1.identity(&req)).unwrap(),
            k2.keys(&k2.identity(&req)).unwrap()
        );
    }

    #[test]
    fn test_registration_validation() {
        let mut r = VariantRegistry::new();
        let noop = |_: &RequestView| VariantValue::None;
        assert!(matches!(r.register("", noop), Err(CacheError::InvalidVariant { .. })));
        assert!(r.register("a:b", noop).is_err());
        assert!(r.register("host", noop).is_err());
        r.register("lang", noop).unwrap();
        assert!(r.register("lang", noop).is_err());
        assert_eq!(r.len(), 1);
    }

    #[test]
    fn test_settings_variants() {
        let settings = CacheSettings::builder()
            .unique_header("Accept-Language")
            .unique_cookie("currency")
            .build();
        let registry = VariantRegistry::new().with_settings(&settings).unwrap();
        let values = registry.evaluate(&view(
            "http://a.test/",
            &[("accept-language", "de"), ("cookie", "currency=EUR")],
        ));
        assert_eq!(values["header:accept-language"], VariantValue::Text("de".into()));
        assert_eq!(values["cookie:currency"], VariantValue::Text("EUR".into()));

        let missing = registry.evaluate(&view("http://a.test/", &[]));
        assert_eq!(missing["cookie:currency"], VariantValue::None);
    }

    #[test]
    fn test_document_key_ignores_query() {
        let b = builder();
        let one = b.keys(&b.identity(&view("http://a.test/post?page=1", &[]))).unwrap();
        let two = b.keys(&b.identity(&view("http://a.test/post?page=2", &[]))).unwrap();
        assert_ne!(one.cache_key, two.cache_key);
        assert_eq!(one.document_version, two.document_version);
        assert!(one.document_version.ends_with(":version"));
    }
}
