//! State for a single-item detail view.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::cache::CacheStore;
use crate::connectivity::ConnectivityOracle;
use crate::jikan::cached_client::CachedJikanClient;
use crate::jikan::source::RemoteSource;
use crate::jikan::types::ListItem;
use crate::query::{wait_for, LoadState, Task};

/// Loads one entry at a time.
///
/// Starting a new load cancels the previous one, so a slow response for an
/// earlier id never replaces the entry currently shown.
pub struct DetailLoader<R, C, N> {
  client: Arc<CachedJikanClient<R, C, N>>,
  id: Option<i64>,
  state: LoadState<ListItem>,
  task: Option<Task<ListItem>>,
}

impl<R, C, N> DetailLoader<R, C, N>
where
  R: RemoteSource + 'static,
  C: CacheStore + 'static,
  N: ConnectivityOracle + 'static,
{
  pub fn new(client: Arc<CachedJikanClient<R, C, N>>) -> Self {
    Self {
      client,
      id: None,
      state: LoadState::Idle,
      task: None,
    }
  }

  /// Start loading `id`, cancelling any load in flight.
  pub fn load(&mut self, id: i64) {
    self.task = None;
    self.id = Some(id);
    self.state = LoadState::Loading;

    debug!(id, "loading detail");
    let client = Arc::clone(&self.client);
    self.task = Some(Task::spawn(async move { client.fetch_detail(id).await }));
  }

  /// Load the current id again. No-op before the first `load`.
  pub fn reload(&mut self) {
    if let Some(id) = self.id {
      self.load(id);
    }
  }

  /// Apply a finished load without waiting. Returns `true` if state changed.
  pub fn poll(&mut self) -> bool {
    match self.task.as_mut().and_then(Task::try_take) {
      Some(result) => {
        self.finish(result);
        true
      }
      None => false,
    }
  }

  /// Wait for the load in flight. Returns `false` if nothing is loading.
  pub async fn next_update(&mut self) -> bool {
    match wait_for(&mut self.task).await {
      Some(result) => {
        self.finish(result);
        true
      }
      None => false,
    }
  }

  fn finish(&mut self, result: Result<ListItem, String>) {
    self.task = None;
    if let Err(message) = &result {
      warn!(id = ?self.id, error = %message, "detail load failed");
    }
    self.state = LoadState::from_result(result);
  }

  pub fn id(&self) -> Option<i64> {
    self.id
  }

  pub fn state(&self) -> &LoadState<ListItem> {
    &self.state
  }
}
