//! Entry serializers
//!
//! The serializer decides the on-store format of a [`PageEntry`](crate::PageEntry)
//! before the codec frames it. All processes sharing a store must agree on it.

use crate::CacheError;
use serde::{Serialize, de::DeserializeOwned};

/// Encoding used for stored entries
pub trait Serializer: Send + Sync + Clone + 'static {
    /// Short name for logs
    fn name(&self) -> &'static str;

    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CacheError>;

    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CacheError>;
}

/// JSON entries, readable with `redis-cli GET`
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn name(&self) -> &'static str {
        "json"
    }

    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CacheError> {
        serde_json::to_vec(value).map_err(|e| CacheError::Serialization(e.to_string()))
    }

    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CacheError> {
        serde_json::from_slice(bytes).map_err(|e| CacheError::Deserialization(e.to_string()))
    }
}

/// MessagePack entries (feature `msgpack`)
#[cfg(feature = "msgpack")]
#[derive(Debug, Clone, Copy, Default)]
pub struct MsgPackSerializer;

#[cfg(feature = "msgpack")]
impl Serializer for MsgPackSerializer {
    fn name(&self) -> &'static str {
        "msgpack"
    }

    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CacheError> {
        rmp_serde::to_vec_named(value).map_err(|e| CacheError::Serialization(e.to_string()))
    }

    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CacheError> {
        rmp_serde::from_slice(bytes).map_err(|e| CacheError::Deserialization(e.to_string()))
    }
}

/// Bincode entries (feature `bincode`)
///
/// Smallest payloads, but the layout follows field order, so a changed
/// entry struct needs a `schema_version` bump.
#[cfg(feature = "bincode")]
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeSerializer;

#[cfg(feature = "bincode")]
impl Serializer for BincodeSerializer {
    fn name(&self) -> &'static str {
        "bincode"
    }

    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CacheError> {
        bincode::serde::encode_to_vec(value, bincode::config::standard())
            .map_err(|e| CacheError::Serialization(e.to_string()))
    }

    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CacheError> {
        bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map(|(value, _)| value)
            .map_err(|e| CacheError::Deserialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HeaderList, PageEntry};

    fn entry() -> PageEntry {
        let mut headers = HeaderList::new();
        headers.insert("content-type".into(), vec!["text/html; charset=utf-8".into()]);
        PageEntry {
            body: b"<html><head></head><body>hello</body></html>".to_vec(),
            captured_at: 1_700_000_000,
            generation_secs: 0.125,
            headers,
            status: 200,
            status_line: Some("HTTP/1.1 200 OK".into()),
            redirect_status: None,
            redirect_location: None,
            max_age: 300,
            schema_version: 1,
            document_version: 3,
        }
    }

    #[test]
    fn test_json_entry_roundtrip() {
        let serializer = JsonSerializer;
        let bytes = serializer.serialize(&entry()).unwrap();
        let decoded: PageEntry = serializer.deserialize(&bytes).unwrap();
        assert_eq!(decoded, entry());
    }

    #[test]
    fn test_json_rejects_garbage() {
        let err = JsonSerializer
            .deserialize::<PageEntry>(b"{not json")
            .unwrap_err();
        assert!(err.is_malformed());
    }

    #[cfg(feature = "msgpack")]
    #[test]
    fn test_msgpack_entry_roundtrip() {
        let bytes = MsgPackSerializer.serialize(&entry()).unwrap();
        let decoded: PageEntry = MsgPackSerializer.deserialize(&bytes).unwrap();
        assert_eq!(decoded, entry());
    }

    #[cfg(feature = "bincode")]
    #[test]
    fn test_bincode_entry_roundtrip() {
        let bytes = BincodeSerializer.serialize(&entry()).unwrap();
        let decoded: PageEntry = BincodeSerializer.deserialize(&bytes).unwrap();
        assert_eq!(decoded, entry());
    }
}
