//! pagevault-http: HTTP primitives for the pagevault page cache
//!
//! Request snapshots, bypass rules, Cache-Control parsing, conditional
//! replay and redirect handling. Nothing here touches the store.

pub mod cache_control;
pub mod conditional;
pub mod policy;
pub mod redirect;
pub mod request;
pub mod response;

pub use cache_control::{CacheControl, NO_CACHE};
pub use conditional::{http_date, is_not_modified, parse_http_date};
pub use policy::{BypassRules, HeaderFilter};
pub use request::RequestView;
pub use response::Replay;
