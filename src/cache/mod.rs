//! Persistent cache for anime entries.
//!
//! Entries are keyed by id and tagged with the list page they came from, so
//! the accumulated list can be rebuilt page by page without a network.

mod storage;
mod traits;

pub use storage::{NoopStore, SqliteStore};
pub use traits::{CacheStore, CachedRow};
