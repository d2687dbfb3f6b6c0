//! Core traits and types for the caching system.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::error::Result;
use crate::jikan::types::{ListItem, TrailerReference};

/// A cached anime entry.
///
/// Rows are keyed by `id`; `page` records which list page the entry was
/// fetched under so the accumulated list can be rebuilt offline.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedRow {
  pub id: i64,
  pub title: String,
  pub title_english: Option<String>,
  pub title_japanese: Option<String>,
  pub episodes: Option<i64>,
  pub score: Option<f64>,
  pub synopsis: Option<String>,
  pub rating: Option<String>,
  pub image_url: Option<String>,
  pub large_image_url: Option<String>,
  pub trailer_youtube_id: Option<String>,
  pub trailer_url: Option<String>,
  pub trailer_embed_url: Option<String>,
  /// Genre names joined with ", "
  pub genres: Option<String>,
  pub kind: Option<String>,
  pub status: Option<String>,
  pub airing: Option<bool>,
  pub duration: Option<String>,
  pub rank: Option<i64>,
  pub popularity: Option<i64>,
  pub season: Option<String>,
  pub year: Option<i64>,
  pub page: i64,
  pub last_updated: DateTime<Utc>,
}

impl CachedRow {
  /// Convert to the domain type (cache fallback path).
  pub fn into_item(self) -> ListItem {
    let trailer = TrailerReference::resolve(
      self.trailer_youtube_id.as_deref(),
      self.trailer_url.as_deref(),
      self.trailer_embed_url.as_deref(),
    );
    let genres = self
      .genres
      .as_deref()
      .map(|g| {
        g.split(", ")
          .filter(|name| !name.is_empty())
          .map(String::from)
          .collect()
      })
      .unwrap_or_default();

    ListItem {
      id: self.id,
      title: self.title_english.unwrap_or(self.title),
      title_japanese: self.title_japanese,
      image_url: self.image_url,
      large_image_url: self.large_image_url,
      score: self.score,
      episodes: self.episodes,
      kind: self.kind,
      status: self.status,
      airing: self.airing,
      rank: self.rank,
      rating: self.rating,
      synopsis: self.synopsis,
      genres,
      trailer,
    }
  }
}

/// Persistent store for cached anime rows.
///
/// Inserts replace any existing row with the same id. Nothing is ever removed
/// except through [`CacheStore::clear_all`].
#[async_trait]
pub trait CacheStore: Send + Sync {
  /// Insert or replace a batch of rows.
  async fn upsert_many(&self, rows: Vec<CachedRow>) -> Result<()>;

  /// Insert or replace a single row.
  async fn upsert_one(&self, row: CachedRow) -> Result<()>;

  /// All rows with `page <= max_page`, ordered by page then rank.
  async fn select_by_page_range(&self, max_page: i64) -> Result<Vec<CachedRow>>;

  /// Highest page number present, if any rows exist.
  async fn select_max_page(&self) -> Result<Option<i64>>;

  /// Look up one row by id.
  async fn select_by_id(&self, id: i64) -> Result<Option<CachedRow>>;

  /// Remove every row.
  async fn clear_all(&self) -> Result<()>;

  /// Remove every row and insert `rows` in their place, as one unit.
  ///
  /// Either the old contents or the new rows are visible afterwards, never
  /// an empty cache in between.
  async fn replace_all(&self, rows: Vec<CachedRow>) -> Result<()>;
}

#[async_trait]
impl<S: CacheStore + ?Sized> CacheStore for Arc<S> {
  async fn upsert_many(&self, rows: Vec<CachedRow>) -> Result<()> {
    (**self).upsert_many(rows).await
  }

  async fn upsert_one(&self, row: CachedRow) -> Result<()> {
    (**self).upsert_one(row).await
  }

  async fn select_by_page_range(&self, max_page: i64) -> Result<Vec<CachedRow>> {
    (**self).select_by_page_range(max_page).await
  }

  async fn select_max_page(&self) -> Result<Option<i64>> {
    (**self).select_max_page().await
  }

  async fn select_by_id(&self, id: i64) -> Result<Option<CachedRow>> {
    (**self).select_by_id(id).await
  }

  async fn clear_all(&self) -> Result<()> {
    (**self).clear_all().await
  }

  async fn replace_all(&self, rows: Vec<CachedRow>) -> Result<()> {
    (**self).replace_all(rows).await
  }
}
