//! In-memory key-value store

mod store;

pub use store::{MemoryConfig, MemoryStore};
