//! Network-first Jikan client with an offline cache fallback.

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::cache::{CacheStore, CachedRow};
use crate::config::ApiConfig;
use crate::connectivity::ConnectivityOracle;
use crate::error::{Error, Result};

use super::api_types::ApiAnime;
use super::source::RemoteSource;
use super::types::{ListItem, PageResult};

/// Jikan client with transparent caching support.
///
/// Every successful network response is written to the cache; when the
/// network is unavailable or a request fails, the cache answers instead.
/// List and detail requests are each serialized through their own lock, so
/// a refresh that clears the cache never interleaves with another page's
/// writes, while a detail lookup never waits on a list fetch.
pub struct CachedJikanClient<R, C, N> {
  source: R,
  cache: C,
  connectivity: N,
  page_limit: u32,
  list_lock: Mutex<()>,
  detail_lock: Mutex<()>,
}

impl<R, C, N> CachedJikanClient<R, C, N>
where
  R: RemoteSource,
  C: CacheStore,
  N: ConnectivityOracle,
{
  pub fn new(source: R, cache: C, connectivity: N) -> Self {
    Self {
      source,
      cache,
      connectivity,
      page_limit: ApiConfig::default().page_limit,
      list_lock: Mutex::new(()),
      detail_lock: Mutex::new(()),
    }
  }

  /// Set how many items are requested per page.
  pub fn with_page_limit(mut self, page_limit: u32) -> Self {
    self.page_limit = page_limit;
    self
  }

  pub fn source(&self) -> &R {
    &self.source
  }

  pub fn connectivity(&self) -> &N {
    &self.connectivity
  }

  pub fn cache(&self) -> &C {
    &self.cache
  }

  /// Fetch one page of the ranked list.
  ///
  /// With `force_refresh` on page 1 the whole cache is replaced by the fresh
  /// page. When served from cache the result holds every cached item up to
  /// `page` and never reports a next page.
  pub async fn fetch_list_page(&self, page: i64, force_refresh: bool) -> Result<PageResult> {
    let _guard = self.list_lock.lock().await;

    if !self.connectivity.is_available() {
      debug!(page, "offline, serving list from cache");
      return self.cached_list(page, None).await;
    }

    match self.fetch_list_from_network(page, force_refresh).await {
      Ok(result) => Ok(result),
      Err(e) => {
        warn!(page, error = %e, "list fetch failed, falling back to cache");
        self.cached_list(page, Some(e)).await
      }
    }
  }

  async fn fetch_list_from_network(&self, page: i64, force_refresh: bool) -> Result<PageResult> {
    let remote = self.source.fetch_list_page(page, self.page_limit).await?;

    let now = Utc::now();
    let rows: Vec<CachedRow> = remote.items.iter().map(|r| r.to_row(page, now)).collect();

    if force_refresh && page == 1 {
      // Wipe stale entries only once fresh data is in hand, in the same
      // write as the new rows
      info!("force refresh, replacing cache");
      self.cache.replace_all(rows).await?;
    } else {
      self.cache.upsert_many(rows).await?;
    }

    info!(
      page,
      count = remote.items.len(),
      has_next_page = remote.has_next_page,
      "list page fetched from network"
    );

    Ok(PageResult {
      items: remote.items.iter().map(ApiAnime::to_item).collect(),
      current_page: page,
      has_next_page: remote.has_next_page,
    })
  }

  async fn cached_list(&self, page: i64, fallback_error: Option<Error>) -> Result<PageResult> {
    let rows = self.cache.select_by_page_range(page).await?;
    let max_cached_page = self.cache.select_max_page().await?.unwrap_or(0);

    if rows.is_empty() {
      return Err(fallback_error.unwrap_or(Error::NoDataAvailable));
    }

    info!(
      page,
      count = rows.len(),
      max_cached_page,
      "list served from cache"
    );

    Ok(PageResult {
      items: rows.into_iter().map(CachedRow::into_item).collect(),
      current_page: max_cached_page,
      has_next_page: false,
    })
  }

  /// Fetch a single entry by id.
  ///
  /// A cached entry keeps the list page it was first seen on.
  pub async fn fetch_detail(&self, id: i64) -> Result<ListItem> {
    let _guard = self.detail_lock.lock().await;

    if !self.connectivity.is_available() {
      debug!(id, "offline, serving detail from cache");
      return self.cached_detail(id, None).await;
    }

    match self.fetch_detail_from_network(id).await {
      Ok(item) => Ok(item),
      Err(e) => {
        warn!(id, error = %e, "detail fetch failed, falling back to cache");
        self.cached_detail(id, Some(e)).await
      }
    }
  }

  async fn fetch_detail_from_network(&self, id: i64) -> Result<ListItem> {
    let record = self.source.fetch_detail(id).await?;

    // The detail endpoint knows nothing about pages
    let page = self
      .cache
      .select_by_id(id)
      .await?
      .map(|row| row.page)
      .unwrap_or(1);
    self.cache.upsert_one(record.to_row(page, Utc::now())).await?;

    info!(id, page, "detail fetched from network");
    Ok(record.to_item())
  }

  async fn cached_detail(&self, id: i64, fallback_error: Option<Error>) -> Result<ListItem> {
    match self.cache.select_by_id(id).await? {
      Some(row) => {
        info!(id, "detail served from cache");
        Ok(row.into_item())
      }
      None => Err(fallback_error.unwrap_or(Error::NoDataAvailable)),
    }
  }
}
