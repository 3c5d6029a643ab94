//! Core types for page cache operations

mod entry;
mod settings;
mod stats;
mod status;

pub use entry::{HeaderList, PageEntry};
pub use settings::{CacheSettings, SettingsBuilder};
pub use stats::CacheStats;
pub use status::{BypassReason, CacheStatus};
