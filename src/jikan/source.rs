//! The remote side of the client, abstracted so the cache logic can be
//! exercised without a network.

use async_trait::async_trait;

use super::api_types::ApiAnime;
use crate::error::Result;

/// One page of raw records as returned by the API.
#[derive(Debug, Clone, Default)]
pub struct RemotePage {
  pub items: Vec<ApiAnime>,
  pub has_next_page: bool,
}

/// A source of anime records.
///
/// Implementations report transport problems and timeouts as
/// [`Error::Network`](crate::error::Error::Network) and unparsable payloads as
/// [`Error::Decode`](crate::error::Error::Decode). Each call is a single
/// attempt.
#[async_trait]
pub trait RemoteSource: Send + Sync {
  /// Fetch one page of the ranked list.
  async fn fetch_list_page(&self, page: i64, limit: u32) -> Result<RemotePage>;

  /// Fetch one record by id.
  async fn fetch_detail(&self, id: i64) -> Result<ApiAnime>;
}
