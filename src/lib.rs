//! Network-first access to the Jikan anime catalogue with an offline cache.
//!
//! [`jikan::CachedJikanClient`] answers list and detail requests from the
//! network when it can and from a local SQLite cache when it cannot.
//! [`pagination::PageAccumulator`] and [`detail::DetailLoader`] hold the
//! per-session state a front-end renders.

pub mod cache;
pub mod config;
pub mod connectivity;
pub mod detail;
pub mod error;
pub mod jikan;
pub mod pagination;
pub mod query;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
