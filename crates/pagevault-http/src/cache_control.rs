/// Value sent on responses that must not be reused by downstream caches
pub const NO_CACHE: &str = "no-cache, must-revalidate, max-age=0";

/// Parsed Cache-Control header directives
///
/// Directive names are matched case-insensitively, and the non-standard
/// `maxage=` spelling some applications emit is accepted as `max-age=`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheControl {
    /// Max age in seconds
    pub max_age: Option<u64>,
    /// S-Maxage (shared cache max age)
    pub s_maxage: Option<u64>,
    pub no_cache: bool,
    pub no_store: bool,
    pub private: bool,
    pub public: bool,
    pub must_revalidate: bool,
}

impl CacheControl {
    /// Parse from header string value
    pub fn parse(header: &str) -> Self {
        let mut cc = Self::default();
        for directive in header.split(',') {
            let directive = directive.trim();
            let (name, value) = match directive.split_once('=') {
                Some((n, v)) => (n.trim(), Some(v.trim().trim_matches('"'))),
                None => (directive, None),
            };
            let secs = value.and_then(|v| v.parse::<u64>().ok());
            match name.to_ascii_lowercase().as_str() {
                "no-cache" => cc.no_cache = true,
                "no-store" => cc.no_store = true,
                "private" => cc.private = true,
                "public" => cc.public = true,
                "must-revalidate" => cc.must_revalidate = true,
                "max-age" | "maxage" => cc.max_age = secs.or(cc.max_age),
                "s-maxage" => cc.s_maxage = secs.or(cc.s_maxage),
                _ => {}
            }
        }
        cc
    }

    /// `Cache-Control` value for a response that is fresh for `secs` more seconds
    pub fn revalidate_after(secs: u64) -> String {
        format!("max-age={secs}, must-revalidate")
    }
}

/// Origin-requested freshness lifetime across every `Cache-Control` value
///
/// The last header carrying a usable `max-age` wins.
pub fn origin_max_age<'a>(values: impl IntoIterator<Item = &'a str>) -> Option<u64> {
    values
        .into_iter()
        .filter_map(|v| CacheControl::parse(v).max_age)
        .last()
}
