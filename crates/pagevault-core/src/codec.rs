//! Byte encoding of stored entries
//!
//! Every stored value starts with a one-byte marker: `r` for a raw
//! serializer payload, `z` for a zstd-compressed one. Both kinds can sit in
//! the same store, so compression can be switched on without a flush.

use std::fmt;
use std::sync::Arc;

use crate::compression::Compressor;
use crate::{CacheError, JsonSerializer, PageEntry, Serializer};

const RAW: u8 = b'r';
const COMPRESSED: u8 = b'z';

/// Encodes and decodes [`PageEntry`] values for the store
#[derive(Clone)]
pub struct EntryCodec<S = JsonSerializer> {
    serializer: S,
    compressor: Option<Arc<dyn Compressor>>,
}

impl Default for EntryCodec<JsonSerializer> {
    fn default() -> Self {
        Self::new(JsonSerializer)
    }
}

impl<S: Serializer> EntryCodec<S> {
    pub fn new(serializer: S) -> Self {
        Self {
            serializer,
            compressor: None,
        }
    }

    /// Compress payloads the compressor accepts, when that makes them smaller
    pub fn with_compressor(mut self, compressor: impl Compressor) -> Self {
        self.compressor = Some(Arc::new(compressor));
        self
    }

    /// Same as [`with_compressor`](Self::with_compressor) for an already shared one
    pub fn with_shared_compressor(mut self, compressor: Arc<dyn Compressor>) -> Self {
        self.compressor = Some(compressor);
        self
    }

    pub fn serializer(&self) -> &S {
        &self.serializer
    }

    pub fn encode(&self, entry: &PageEntry) -> Result<Vec<u8>, CacheError> {
        let payload = self.serializer.serialize(entry)?;
        match &self.compressor {
            Some(c) if c.accepts(&payload) => {
                let packed = c.compress(&payload)?;
                if packed.len() < payload.len() {
                    Ok(framed(COMPRESSED, &packed))
                } else {
                    Ok(framed(RAW, &payload))
                }
            }
            _ => Ok(framed(RAW, &payload)),
        }
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<PageEntry, CacheError> {
        let (marker, payload) = bytes
            .split_first()
            .ok_or_else(|| CacheError::Deserialization("empty entry".into()))?;
        match *marker {
            RAW => self.serializer.deserialize(payload),
            COMPRESSED => {
                let compressor = self.compressor.as_ref().ok_or_else(|| {
                    CacheError::Decompression("compressed entry but no compressor".into())
                })?;
                let unpacked = compressor.decompress(payload)?;
                self.serializer.deserialize(&unpacked)
            }
            other => Err(CacheError::Deserialization(format!(
                "unknown entry marker 0x{other:02x}"
            ))),
        }
    }
}

fn framed(marker: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 1);
    out.push(marker);
    out.extend_from_slice(payload);
    out
}

impl<S: Serializer> fmt::Debug for EntryCodec<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryCodec")
            .field("serializer", &self.serializer.name())
            .field(
                "compressor",
                &self.compressor.as_ref().map(|c| c.name()),
            )
            .finish()
    }
}
