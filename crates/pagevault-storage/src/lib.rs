//! pagevault-storage: Key-value stores for pagevault

pub mod guard;

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "redis")]
pub mod redis;

pub use guard::{CircuitBreaker, GuardedStore};

#[cfg(feature = "memory")]
pub use memory::{MemoryConfig, MemoryStore};

#[cfg(feature = "redis")]
pub use redis::{RedisConfig, RedisStore};
