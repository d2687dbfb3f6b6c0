//! In-memory doubles for the remote source and the cache store.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::cache::{CacheStore, CachedRow};
use crate::error::{Error, Result};
use crate::jikan::api_types::ApiAnime;
use crate::jikan::source::{RemotePage, RemoteSource};

pub fn anime(id: i64, rank: i64) -> ApiAnime {
  ApiAnime {
    mal_id: id,
    title: format!("Anime {}", id),
    rank: Some(rank),
    ..Default::default()
  }
}

/// Remote source serving canned pages.
#[derive(Default)]
pub struct MockSource {
  pages: Mutex<HashMap<i64, RemotePage>>,
  details: Mutex<HashMap<i64, ApiAnime>>,
  delays: Mutex<HashMap<i64, Duration>>,
  failing: AtomicBool,
  pub list_calls: AtomicUsize,
  pub detail_calls: AtomicUsize,
}

impl MockSource {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_page(self, page: i64, items: Vec<ApiAnime>, has_next_page: bool) -> Self {
    self.set_page(page, items, has_next_page);
    self
  }

  pub fn with_detail(self, record: ApiAnime) -> Self {
    self.details.lock().unwrap().insert(record.mal_id, record);
    self
  }

  /// Delay responses for `page` (or detail id `page`).
  pub fn with_delay(self, page: i64, delay: Duration) -> Self {
    self.delays.lock().unwrap().insert(page, delay);
    self
  }

  pub fn set_page(&self, page: i64, items: Vec<ApiAnime>, has_next_page: bool) {
    self.pages.lock().unwrap().insert(
      page,
      RemotePage {
        items,
        has_next_page,
      },
    );
  }

  pub fn set_failing(&self, failing: bool) {
    self.failing.store(failing, Ordering::SeqCst);
  }

  async fn delay(&self, key: i64) {
    let delay = self.delays.lock().unwrap().get(&key).copied();
    if let Some(delay) = delay {
      tokio::time::sleep(delay).await;
    }
  }
}

#[async_trait]
impl RemoteSource for MockSource {
  async fn fetch_list_page(&self, page: i64, _limit: u32) -> Result<RemotePage> {
    self.list_calls.fetch_add(1, Ordering::SeqCst);
    // Content is fixed when the request starts
    let response = self.pages.lock().unwrap().get(&page).cloned();
    self.delay(page).await;
    if self.failing.load(Ordering::SeqCst) {
      return Err(Error::Network("connection reset".to_string()));
    }
    response.ok_or_else(|| Error::Network(format!("HTTP 404 for page {}", page)))
  }

  async fn fetch_detail(&self, id: i64) -> Result<ApiAnime> {
    self.detail_calls.fetch_add(1, Ordering::SeqCst);
    self.delay(id).await;
    if self.failing.load(Ordering::SeqCst) {
      return Err(Error::Network("connection reset".to_string()));
    }
    self
      .details
      .lock()
      .unwrap()
      .get(&id)
      .cloned()
      .ok_or_else(|| Error::Network(format!("HTTP 404 for anime {}", id)))
  }
}

/// A recorded store operation.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOp {
  Clear,
  /// (id, page) of each row written
  Upsert(Vec<(i64, i64)>),
  /// Rows written by a replace, as (id, page)
  Replace(Vec<(i64, i64)>),
  SelectRange(i64),
  SelectMaxPage,
  SelectById(i64),
}

/// Cache store that records operations and flags overlapping calls.
///
/// Each operation sleeps for `op_delay` while marked active, so two callers
/// that are not serialized end up overlapping.
#[derive(Default)]
pub struct RecordingStore {
  rows: Mutex<BTreeMap<i64, CachedRow>>,
  ops: Mutex<Vec<StoreOp>>,
  active: AtomicUsize,
  overlapped: AtomicBool,
  failing: AtomicBool,
  op_delay: Duration,
}

impl RecordingStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_op_delay(mut self, delay: Duration) -> Self {
    self.op_delay = delay;
    self
  }

  pub fn set_failing(&self, failing: bool) {
    self.failing.store(failing, Ordering::SeqCst);
  }

  pub fn ops(&self) -> Vec<StoreOp> {
    self.ops.lock().unwrap().clone()
  }

  pub fn overlapped(&self) -> bool {
    self.overlapped.load(Ordering::SeqCst)
  }

  pub fn row(&self, id: i64) -> Option<CachedRow> {
    self.rows.lock().unwrap().get(&id).cloned()
  }

  /// Mark an operation active for `op_delay`.
  ///
  /// The returned guard keeps it active; dropping it (including when the
  /// caller is aborted mid-sleep) ends the operation.
  async fn enter(&self, op: StoreOp) -> Result<ActiveOp<'_>> {
    if self.active.fetch_add(1, Ordering::SeqCst) > 0 {
      self.overlapped.store(true, Ordering::SeqCst);
    }
    let guard = ActiveOp(&self.active);
    self.ops.lock().unwrap().push(op);
    if !self.op_delay.is_zero() {
      tokio::time::sleep(self.op_delay).await;
    }
    if self.failing.load(Ordering::SeqCst) {
      return Err(Error::Storage("disk I/O error".to_string()));
    }
    Ok(guard)
  }
}

struct ActiveOp<'a>(&'a AtomicUsize);

impl Drop for ActiveOp<'_> {
  fn drop(&mut self) {
    self.0.fetch_sub(1, Ordering::SeqCst);
  }
}

#[async_trait]
impl CacheStore for RecordingStore {
  async fn upsert_many(&self, rows: Vec<CachedRow>) -> Result<()> {
    let _op = self
      .enter(StoreOp::Upsert(rows.iter().map(|r| (r.id, r.page)).collect()))
      .await?;
    let mut stored = self.rows.lock().unwrap();
    for row in rows {
      stored.insert(row.id, row);
    }
    Ok(())
  }

  async fn upsert_one(&self, row: CachedRow) -> Result<()> {
    self.upsert_many(vec![row]).await
  }

  async fn select_by_page_range(&self, max_page: i64) -> Result<Vec<CachedRow>> {
    let _op = self.enter(StoreOp::SelectRange(max_page)).await?;
    let mut rows: Vec<CachedRow> = self
      .rows
      .lock()
      .unwrap()
      .values()
      .filter(|r| r.page <= max_page)
      .cloned()
      .collect();
    rows.sort_by_key(|r| (r.page, r.rank.is_none(), r.rank, r.id));
    Ok(rows)
  }

  async fn select_max_page(&self) -> Result<Option<i64>> {
    let _op = self.enter(StoreOp::SelectMaxPage).await?;
    let max = self.rows.lock().unwrap().values().map(|r| r.page).max();
    Ok(max)
  }

  async fn select_by_id(&self, id: i64) -> Result<Option<CachedRow>> {
    let _op = self.enter(StoreOp::SelectById(id)).await?;
    let row = self.rows.lock().unwrap().get(&id).cloned();
    Ok(row)
  }

  async fn clear_all(&self) -> Result<()> {
    let _op = self.enter(StoreOp::Clear).await?;
    self.rows.lock().unwrap().clear();
    Ok(())
  }

  async fn replace_all(&self, rows: Vec<CachedRow>) -> Result<()> {
    let _op = self
      .enter(StoreOp::Replace(rows.iter().map(|r| (r.id, r.page)).collect()))
      .await?;
    // Applied after the only await, so an aborted caller changes nothing
    let mut stored = self.rows.lock().unwrap();
    stored.clear();
    for row in rows {
      stored.insert(row.id, row);
    }
    Ok(())
  }
}
