//! Redirect replay

use http::{StatusCode, Version};

/// Status used to replay a stored redirect
///
/// Codes outside 300..=307 replay as `302 Found`.
pub fn replay_status(stored: Option<u16>) -> StatusCode {
    stored
        .filter(|code| (300..=307).contains(code))
        .and_then(|code| StatusCode::from_u16(code).ok())
        .unwrap_or(StatusCode::FOUND)
}

/// Protocol version for a replayed redirect
///
/// Only HTTP/1.0 and HTTP/1.1 are echoed; anything else answers as HTTP/1.0.
pub fn replay_version(request: Version) -> Version {
    if request == Version::HTTP_11 {
        Version::HTTP_11
    } else {
        Version::HTTP_10
    }
}

/// Whether a rendered response is a redirect worth storing as one
pub fn is_redirect(status: StatusCode, location: Option<&str>) -> bool {
    status.is_redirection() && location.is_some_and(|l| !l.is_empty())
}
