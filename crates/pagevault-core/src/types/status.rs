//! Cache status signal values

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome reported on every response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CacheStatus {
    /// Replayed from a stored entry
    Hit,
    /// Rendered by origin and stored
    Miss,
    /// Rendered by origin and not stored
    Bypass,
    /// A store operation failed during the request
    Down,
}

impl CacheStatus {
    /// Stable header value
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
            CacheStatus::Bypass => "BYPASS",
            CacheStatus::Down => "DOWN",
        }
    }

    /// Apply the store-failure override
    ///
    /// `DOWN` replaces `MISS` and `BYPASS`; a `HIT` stays a `HIT`.
    pub fn with_store_down(self, down: bool) -> Self {
        match self {
            CacheStatus::Miss | CacheStatus::Bypass if down => CacheStatus::Down,
            other => other,
        }
    }
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a response was not served from or written to the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BypassReason {
    /// `max_age` is zero
    Disabled,
    /// Not a GET or HEAD request
    Method,
    /// Request carries credentials
    Auth,
    /// Request carries a session cookie
    Cookie,
    /// Path matched the deny-list
    FilenameDenylist,
    /// Rendered body was empty
    NoContent,
    /// Origin answered with a 5xx
    BadStatus,
    /// Origin set a cookie
    SetCookie,
    /// Application canceled caching for this response
    Canceled,
    /// Cache key changed during rendering
    KeyMismatch,
    /// Another request holds the regeneration lock
    LockContention,
}

impl BypassReason {
    /// Stable header value
    pub fn as_str(&self) -> &'static str {
        match self {
            BypassReason::Disabled => "disabled",
            BypassReason::Method => "method",
            BypassReason::Auth => "auth",
            BypassReason::Cookie => "cookie",
            BypassReason::FilenameDenylist => "filename-denylist",
            BypassReason::NoContent => "no-content",
            BypassReason::BadStatus => "bad-status",
            BypassReason::SetCookie => "set-cookie",
            BypassReason::Canceled => "canceled",
            BypassReason::KeyMismatch => "key-mismatch",
            BypassReason::LockContention => "lock-contention",
        }
    }

    /// Whether downstream caches should be told not to store the response
    ///
    /// `disabled` and `lock-contention` concern documents that are
    /// cacheable in principle, so they keep whatever the origin sent.
    pub fn sends_no_cache(&self) -> bool {
        !matches!(self, BypassReason::Disabled | BypassReason::LockContention)
    }
}

impl fmt::Display for BypassReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_as_str() {
        assert_eq!(CacheStatus::Hit.as_str(), "HIT");
        assert_eq!(CacheStatus::Down.to_string(), "DOWN");
    }

    #[test]
    fn test_down_override() {
        assert_eq!(CacheStatus::Miss.with_store_down(true), CacheStatus::Down);
        assert_eq!(CacheStatus::Bypass.with_store_down(true), CacheStatus::Down);
        assert_eq!(CacheStatus::Hit.with_store_down(true), CacheStatus::Hit);
        assert_eq!(CacheStatus::Miss.with_store_down(false), CacheStatus::Miss);
    }

    #[test]
    fn test_reason_values() {
        assert_eq!(BypassReason::FilenameDenylist.as_str(), "filename-denylist");
        assert_eq!(BypassReason::LockContention.as_str(), "lock-contention");
        assert_eq!(
            serde_json::to_string(&BypassReason::SetCookie).unwrap(),
            "\"set-cookie\""
        );
    }

    #[test]
    fn test_no_cache_exemptions() {
        assert!(!BypassReason::Disabled.sends_no_cache());
        assert!(!BypassReason::LockContention.sends_no_cache());
        assert!(BypassReason::Cookie.sends_no_cache());
        assert!(BypassReason::SetCookie.sends_no_cache());
    }
}
