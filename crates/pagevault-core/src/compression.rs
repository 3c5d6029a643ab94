//! Compression for stored page entries
//!
//! Rendered HTML shrinks several-fold under zstd, so large entries are
//! compressed before they reach the store. The codec keeps an entry raw
//! whenever compression would not make it smaller.

use crate::CacheError;

/// Encoded entries smaller than this are stored raw
pub const DEFAULT_THRESHOLD: usize = 1024;

/// Byte-level compression applied by [`EntryCodec`](crate::EntryCodec)
pub trait Compressor: Send + Sync + std::fmt::Debug + 'static {
    /// Short name for logs
    fn name(&self) -> &'static str;

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CacheError>;

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CacheError>;

    /// Whether a payload is large enough to be worth compressing
    fn accepts(&self, payload: &[u8]) -> bool {
        payload.len() >= DEFAULT_THRESHOLD
    }
}

/// Zstd compressor for entry payloads
#[cfg(feature = "compression")]
#[derive(Debug, Clone)]
pub struct ZstdCompressor {
    level: i32,
    threshold: usize,
}

#[cfg(feature = "compression")]
impl Default for ZstdCompressor {
    fn default() -> Self {
        Self::new(3)
    }
}

#[cfg(feature = "compression")]
impl ZstdCompressor {
    /// Compressor at `level`, clamped to 1..=22
    pub fn new(level: i32) -> Self {
        Self {
            level: level.clamp(1, 22),
            threshold: DEFAULT_THRESHOLD,
        }
    }

    /// Smallest payload that gets compressed
    pub fn threshold(mut self, bytes: usize) -> Self {
        self.threshold = bytes;
        self
    }

    pub fn level(&self) -> i32 {
        self.level
    }
}

#[cfg(feature = "compression")]
impl Compressor for ZstdCompressor {
    fn name(&self) -> &'static str {
        "zstd"
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CacheError> {
        zstd::encode_all(data, self.level).map_err(|e| CacheError::Compression(e.to_string()))
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CacheError> {
        zstd::decode_all(data).map_err(|e| CacheError::Decompression(e.to_string()))
    }

    fn accepts(&self, payload: &[u8]) -> bool {
        payload.len() >= self.threshold
    }
}

#[cfg(all(test, feature = "compression"))]
mod tests {
    use super::*;

    fn listing() -> Vec<u8> {
        "<li class=\"post\"><a href=\"/post\">A post title</a></li>"
            .repeat(200)
            .into_bytes()
    }

    #[test]
    fn test_html_shrinks() {
        let zstd = ZstdCompressor::default();
        let page = listing();

        let packed = zstd.compress(&page).unwrap();
        assert!(packed.len() * 4 < page.len());
        assert_eq!(zstd.decompress(&packed).unwrap(), page);
    }

    #[test]
    fn test_threshold() {
        let zstd = ZstdCompressor::default();
        assert!(!zstd.accepts(b"<p>short</p>"));
        assert!(zstd.accepts(&listing()));
        assert!(ZstdCompressor::new(3).threshold(0).accepts(b"x"));
    }

    #[test]
    fn test_level_is_clamped() {
        assert_eq!(ZstdCompressor::new(-5).level(), 1);
        assert_eq!(ZstdCompressor::new(100).level(), 22);
    }

    #[test]
    fn test_garbage_is_decompression_error() {
        let err = ZstdCompressor::default().decompress(b"not zstd").unwrap_err();
        assert!(err.is_malformed());
    }
}
