//! Jikan API access: wire types, the HTTP client and the caching wrapper.

pub mod api_types;
pub mod cached_client;
pub mod client;
pub mod source;
pub mod types;

pub use cached_client::CachedJikanClient;
pub use client::JikanClient;
pub use source::{RemotePage, RemoteSource};
pub use types::{ListItem, PageResult, TrailerReference};
