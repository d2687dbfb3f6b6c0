use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::ApiConfig;
use crate::error::{Error, Result};
use crate::jikan::api_types::{ApiAnime, ApiAnimeDetailResponse, ApiTopAnimeResponse};
use crate::jikan::source::{RemotePage, RemoteSource};

/// Jikan REST API client
#[derive(Clone)]
pub struct JikanClient {
  http: reqwest::Client,
  base_url: Url,
}

impl JikanClient {
  pub fn new(config: &ApiConfig) -> Result<Self> {
    let mut base_url = Url::parse(&config.base_url)
      .map_err(|e| Error::Config(format!("invalid API url {}: {}", config.base_url, e)))?;

    // Url::join drops the last path segment unless it ends with a slash
    if !base_url.path().ends_with('/') {
      let path = format!("{}/", base_url.path());
      base_url.set_path(&path);
    }

    let timeout = Duration::from_secs(config.timeout_secs);
    let http = reqwest::Client::builder()
      .connect_timeout(timeout)
      .timeout(timeout)
      .user_agent(concat!("anicache/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

    Ok(Self { http, base_url })
  }

  fn endpoint(&self, path: &str) -> Result<Url> {
    self
      .base_url
      .join(path)
      .map_err(|e| Error::Config(format!("invalid endpoint {}: {}", path, e)))
  }

  fn top_anime_url(&self, page: i64, limit: u32) -> Result<Url> {
    let mut url = self.endpoint("top/anime")?;
    url
      .query_pairs_mut()
      .append_pair("page", &page.to_string())
      .append_pair("limit", &limit.to_string());
    Ok(url)
  }

  fn anime_url(&self, id: i64) -> Result<Url> {
    self.endpoint(&format!("anime/{}", id))
  }

  /// GET a JSON document, separating transport failures from bad payloads.
  async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
    debug!(%url, "GET");

    let response = self
      .http
      .get(url.clone())
      .send()
      .await
      .map_err(|e| Error::Network(format!("Request to {} failed: {}", url, e)))?;

    let status = response.status();
    if !status.is_success() {
      return Err(Error::Network(format!("{} returned HTTP {}", url, status)));
    }

    let body = response
      .bytes()
      .await
      .map_err(|e| Error::Network(format!("Failed to read response from {}: {}", url, e)))?;

    serde_json::from_slice(&body)
      .map_err(|e| Error::Decode(format!("Failed to parse response from {}: {}", url, e)))
  }
}

#[async_trait]
impl RemoteSource for JikanClient {
  async fn fetch_list_page(&self, page: i64, limit: u32) -> Result<RemotePage> {
    let url = self.top_anime_url(page, limit)?;
    let response: ApiTopAnimeResponse = self.get_json(url).await?;

    Ok(RemotePage {
      has_next_page: response
        .pagination
        .map(|p| p.has_next_page)
        .unwrap_or(false),
      items: response.data,
    })
  }

  async fn fetch_detail(&self, id: i64) -> Result<ApiAnime> {
    let url = self.anime_url(id)?;
    let response: ApiAnimeDetailResponse = self.get_json(url).await?;
    Ok(response.data)
  }
}
