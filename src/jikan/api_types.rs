//! Serde-deserializable types matching Jikan API responses.
//!
//! These types are separate from domain types to allow clean deserialization
//! while keeping domain types focused on application needs. Conversions into
//! [`ListItem`] and [`CachedRow`] live here too, so changes to the wire format
//! stay local to this file.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::cache::CachedRow;

use super::types::{ListItem, TrailerReference};

// ============================================================================
// Response envelopes
// ============================================================================

/// `GET top/anime`
#[derive(Debug, Deserialize)]
pub struct ApiTopAnimeResponse {
  pub pagination: Option<ApiPagination>,
  #[serde(default)]
  pub data: Vec<ApiAnime>,
}

/// `GET anime/{id}`
#[derive(Debug, Deserialize)]
pub struct ApiAnimeDetailResponse {
  pub data: ApiAnime,
}

#[derive(Debug, Deserialize)]
pub struct ApiPagination {
  #[serde(default)]
  pub has_next_page: bool,
}

// ============================================================================
// Anime record
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiImageUrls {
  pub image_url: Option<String>,
  pub large_image_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiImages {
  pub jpg: Option<ApiImageUrls>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiTrailer {
  pub youtube_id: Option<String>,
  pub url: Option<String>,
  pub embed_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiGenre {
  pub name: String,
}

/// A raw anime record as returned by both the list and the detail endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiAnime {
  pub mal_id: i64,
  pub title: String,
  pub title_english: Option<String>,
  pub title_japanese: Option<String>,
  pub images: Option<ApiImages>,
  pub trailer: Option<ApiTrailer>,
  #[serde(rename = "type")]
  pub kind: Option<String>,
  pub episodes: Option<i64>,
  pub status: Option<String>,
  pub airing: Option<bool>,
  pub duration: Option<String>,
  pub rating: Option<String>,
  pub score: Option<f64>,
  pub rank: Option<i64>,
  pub popularity: Option<i64>,
  pub synopsis: Option<String>,
  pub season: Option<String>,
  pub year: Option<i64>,
  pub genres: Option<Vec<ApiGenre>>,
}

impl ApiAnime {
  /// English title when present, otherwise the default title.
  fn display_title(&self) -> String {
    self.title_english.clone().unwrap_or_else(|| self.title.clone())
  }

  fn jpg(&self) -> Option<&ApiImageUrls> {
    self.images.as_ref().and_then(|i| i.jpg.as_ref())
  }

  fn trailer_field(&self, pick: impl Fn(&ApiTrailer) -> Option<&String>) -> Option<String> {
    self.trailer.as_ref().and_then(pick).cloned()
  }

  /// Convert to the domain type (network-first path).
  pub fn to_item(&self) -> ListItem {
    let trailer = self.trailer.as_ref();
    ListItem {
      id: self.mal_id,
      title: self.display_title(),
      title_japanese: self.title_japanese.clone(),
      image_url: self.jpg().and_then(|j| j.image_url.clone()),
      large_image_url: self.jpg().and_then(|j| j.large_image_url.clone()),
      score: self.score,
      episodes: self.episodes,
      kind: self.kind.clone(),
      status: self.status.clone(),
      airing: self.airing,
      rank: self.rank,
      rating: self.rating.clone(),
      synopsis: self.synopsis.clone(),
      genres: self
        .genres
        .as_ref()
        .map(|g| g.iter().map(|genre| genre.name.clone()).collect())
        .unwrap_or_default(),
      trailer: TrailerReference::resolve(
        trailer.and_then(|t| t.youtube_id.as_deref()),
        trailer.and_then(|t| t.url.as_deref()),
        trailer.and_then(|t| t.embed_url.as_deref()),
      ),
    }
  }

  /// Convert to a cache row tagged with the page it was fetched under.
  pub fn to_row(&self, page: i64, now: DateTime<Utc>) -> CachedRow {
    CachedRow {
      id: self.mal_id,
      title: self.display_title(),
      title_english: self.title_english.clone(),
      title_japanese: self.title_japanese.clone(),
      episodes: self.episodes,
      score: self.score,
      synopsis: self.synopsis.clone(),
      rating: self.rating.clone(),
      image_url: self.jpg().and_then(|j| j.image_url.clone()),
      large_image_url: self.jpg().and_then(|j| j.large_image_url.clone()),
      trailer_youtube_id: self.trailer_field(|t| t.youtube_id.as_ref()),
      trailer_url: self.trailer_field(|t| t.url.as_ref()),
      trailer_embed_url: self.trailer_field(|t| t.embed_url.as_ref()),
      genres: self.genres.as_ref().map(|g| {
        g.iter()
          .map(|genre| genre.name.as_str())
          .collect::<Vec<_>>()
          .join(", ")
      }),
      kind: self.kind.clone(),
      status: self.status.clone(),
      airing: self.airing,
      duration: self.duration.clone(),
      rank: self.rank,
      popularity: self.popularity,
      season: self.season.clone(),
      year: self.year,
      page,
      last_updated: now,
    }
  }
}
