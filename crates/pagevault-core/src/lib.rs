//! pagevault-core: Core traits and types for the pagevault page cache
//!
//! This crate provides the store interface, the stored entry format,
//! settings, status values and metrics hooks shared by the rest of the
//! workspace.

pub mod codec;
pub mod compression;
mod error;
mod traits;
mod types;

pub use codec::EntryCodec;
pub use error::{CacheError, Result};
pub use traits::*;
pub use types::*;
pub use compression::Compressor;

#[cfg(feature = "compression")]
pub use compression::ZstdCompressor;
