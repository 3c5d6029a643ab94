//! Error types for cache operations

use thiserror::Error;

/// Main error type for all cache operations
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// Serialization failed
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization failed
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Store connection failed
    #[error("connection error: {0}")]
    Connection(String),

    /// Store operation failed
    #[error("backend error: {0}")]
    Backend(String),

    /// Store call exceeded the configured timeout
    #[error("operation timed out")]
    Timeout,

    /// Compression failed
    #[error("compression error: {0}")]
    Compression(String),

    /// Decompression failed
    #[error("decompression error: {0}")]
    Decompression(String),

    /// A variant dimension was rejected at registration
    #[error("invalid variant dimension {name:?}: {reason}")]
    InvalidVariant { name: String, reason: String },

    /// Pre-render and post-render keys disagree
    #[error("cache key mismatch: dispatched under {dispatched}, captured under {captured}")]
    KeyMismatch {
        dispatched: String,
        captured: String,
    },

    /// Settings failed to load or validate
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl CacheError {
    /// True when the error means the store could not be reached.
    ///
    /// These errors drive the `DOWN` status and trip the store guard.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            CacheError::Connection(_) | CacheError::Backend(_) | CacheError::Timeout
        )
    }

    /// True when a stored value exists but cannot be decoded.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            CacheError::Deserialization(_) | CacheError::Decompression(_)
        )
    }
}

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;
