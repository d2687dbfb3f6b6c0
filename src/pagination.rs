//! Incremental "load more" on top of [`CachedJikanClient`].
//!
//! A [`PageAccumulator`] belongs to one list session. It owns the running
//! list, the page cursor and the loading flags; nothing here is shared
//! between sessions.
//!
//! Two kinds of failure are kept apart: a failed first page puts the whole
//! list into [`LoadState::Error`], while a failed "next page" only raises
//! [`PageAccumulator::pagination_failed`] and leaves the loaded items alone.

use futures::stream::{BoxStream, Fuse};
use futures::{FutureExt, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::CacheStore;
use crate::connectivity::ConnectivityOracle;
use crate::jikan::cached_client::CachedJikanClient;
use crate::jikan::source::RemoteSource;
use crate::jikan::types::{ListItem, PageResult};
use crate::query::{wait_for, LoadState, Task};

/// What woke up the accumulator.
enum Update {
  Refreshed(Result<PageResult, String>),
  NextPage(Result<PageResult, String>),
  Connectivity(bool),
}

/// Accumulated, deduplicated list state for one browsing session.
///
/// Drive it by calling [`poll`](Self::poll) from an event loop tick, or by
/// awaiting [`next_update`](Self::next_update).
pub struct PageAccumulator<R, C, N> {
  client: Arc<CachedJikanClient<R, C, N>>,
  state: LoadState<Vec<ListItem>>,
  seen: HashSet<i64>,
  current_page: i64,
  has_next_page: bool,
  is_loading_more: bool,
  pagination_failed: bool,
  is_offline: bool,
  refresh_task: Option<Task<PageResult>>,
  page_task: Option<Task<PageResult>>,
  connectivity: Fuse<BoxStream<'static, bool>>,
}

impl<R, C, N> PageAccumulator<R, C, N>
where
  R: RemoteSource + 'static,
  C: CacheStore + 'static,
  N: ConnectivityOracle + 'static,
{
  /// Create an idle session. Call [`refresh`](Self::refresh) to load page 1.
  pub fn new(client: Arc<CachedJikanClient<R, C, N>>) -> Self {
    let mut connectivity = client.connectivity().observe_changes().fuse();

    // The first emission is the current state, not a transition
    let is_offline = match connectivity.next().now_or_never() {
      Some(Some(connected)) => !connected,
      _ => !client.connectivity().is_available(),
    };

    Self {
      client,
      state: LoadState::Idle,
      seen: HashSet::new(),
      current_page: 1,
      has_next_page: true,
      is_loading_more: false,
      pagination_failed: false,
      is_offline,
      refresh_task: None,
      page_task: None,
      connectivity,
    }
  }

  /// Start over from page 1.
  ///
  /// Any in-flight refresh or next-page fetch is cancelled first so its
  /// result can never land on top of the new list.
  pub fn refresh(&mut self, force_refresh: bool) {
    self.refresh_task = None;
    self.page_task = None;

    self.current_page = 1;
    self.has_next_page = true;
    self.seen.clear();
    self.is_loading_more = false;
    self.pagination_failed = false;
    self.state = LoadState::Loading;

    debug!(force_refresh, "refreshing list");
    let client = Arc::clone(&self.client);
    self.refresh_task = Some(Task::spawn(async move {
      client.fetch_list_page(1, force_refresh).await
    }));
  }

  /// Fetch the page after the current one.
  ///
  /// No-op unless the list is loaded, more pages exist and no next-page
  /// fetch is already running. While page 1 is loading or has failed there
  /// is no cursor to continue from.
  pub fn load_next_page(&mut self) {
    if !self.state.is_success() || !self.has_next_page || self.is_loading_more {
      return;
    }

    // Local value - current_page only moves once the fetch succeeds
    let next_page = self.current_page + 1;
    self.pagination_failed = false;
    self.is_loading_more = true;

    debug!(page = next_page, "loading next page");
    let client = Arc::clone(&self.client);
    self.page_task = Some(Task::spawn(async move {
      client.fetch_list_page(next_page, false).await
    }));
  }

  /// Clear a pagination failure and try the next page again.
  pub fn retry_next_page(&mut self) {
    self.pagination_failed = false;
    self.load_next_page();
  }

  /// Apply whatever has completed since the last call, without waiting.
  ///
  /// Returns `true` if any state changed.
  pub fn poll(&mut self) -> bool {
    let mut changed = false;

    if let Some(result) = self.refresh_task.as_mut().and_then(Task::try_take) {
      self.apply(Update::Refreshed(result));
      changed = true;
    }

    if let Some(result) = self.page_task.as_mut().and_then(Task::try_take) {
      self.apply(Update::NextPage(result));
      changed = true;
    }

    while let Some(Some(connected)) = self.connectivity.next().now_or_never() {
      self.apply(Update::Connectivity(connected));
      changed = true;
    }

    changed
  }

  /// Wait for the next completed fetch or connectivity change and apply it.
  ///
  /// Returns `false` once nothing can change any more (no fetch in flight and
  /// the connectivity stream has ended).
  pub async fn next_update(&mut self) -> bool {
    let update = tokio::select! {
      Some(result) = wait_for(&mut self.refresh_task) => Update::Refreshed(result),
      Some(result) = wait_for(&mut self.page_task) => Update::NextPage(result),
      Some(connected) = self.connectivity.next() => Update::Connectivity(connected),
      else => return false,
    };
    self.apply(update);
    true
  }

  fn apply(&mut self, update: Update) {
    match update {
      Update::Refreshed(result) => {
        self.refresh_task = None;
        match result {
          Ok(page) => {
            let mut items = Vec::with_capacity(page.items.len());
            self.append_unique(&mut items, page.items);
            self.current_page = page.current_page;
            self.has_next_page = page.has_next_page;
            info!(
              count = items.len(),
              current_page = self.current_page,
              has_next_page = self.has_next_page,
              "list loaded"
            );
            self.state = LoadState::Success(items);
          }
          Err(message) => {
            warn!(error = %message, "list load failed");
            self.state = LoadState::Error(message);
          }
        }
      }
      Update::NextPage(result) => {
        self.page_task = None;
        self.is_loading_more = false;
        match result {
          Ok(page) => {
            let mut items = match std::mem::replace(&mut self.state, LoadState::Idle) {
              LoadState::Success(items) => items,
              _ => Vec::new(),
            };
            let before = items.len();
            self.append_unique(&mut items, page.items);
            self.current_page = page.current_page;
            self.has_next_page = page.has_next_page;
            info!(
              added = items.len() - before,
              current_page = self.current_page,
              has_next_page = self.has_next_page,
              "next page loaded"
            );
            self.state = LoadState::Success(items);
          }
          Err(message) => {
            warn!(error = %message, "next page failed");
            self.pagination_failed = true;
          }
        }
      }
      Update::Connectivity(connected) => {
        self.is_offline = !connected;
        // Only the full-screen error retries by itself; a failed next page
        // waits for retry_next_page
        if connected && self.state.is_error() {
          info!("connectivity restored, refreshing list");
          self.refresh(true);
        }
      }
    }
  }

  /// Append `incoming` to `items`, dropping ids already seen.
  fn append_unique(&mut self, items: &mut Vec<ListItem>, incoming: Vec<ListItem>) {
    for item in incoming {
      if self.seen.insert(item.id) {
        items.push(item);
      }
    }
  }

  pub fn state(&self) -> &LoadState<Vec<ListItem>> {
    &self.state
  }

  /// Items loaded so far (empty unless the list is loaded).
  pub fn items(&self) -> &[ListItem] {
    self.state.data().map(Vec::as_slice).unwrap_or(&[])
  }

  pub fn current_page(&self) -> i64 {
    self.current_page
  }

  pub fn has_next_page(&self) -> bool {
    self.has_next_page
  }

  pub fn is_loading_more(&self) -> bool {
    self.is_loading_more
  }

  pub fn pagination_failed(&self) -> bool {
    self.pagination_failed
  }

  pub fn is_offline(&self) -> bool {
    self.is_offline
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::SqliteStore;
  use crate::connectivity::ManualConnectivity;
  use crate::testing::{anime, MockSource, RecordingStore};
  use std::sync::atomic::Ordering;
  use std::time::Duration;

  type Session = PageAccumulator<MockSource, SqliteStore, Arc<ManualConnectivity>>;

  fn session(source: MockSource, online: bool) -> (Session, Arc<ManualConnectivity>) {
    let connectivity = Arc::new(ManualConnectivity::new(online));
    let client = Arc::new(CachedJikanClient::new(
      source,
      SqliteStore::open_in_memory().unwrap(),
      Arc::clone(&connectivity),
    ));
    (PageAccumulator::new(client), connectivity)
  }

  fn ids(session: &Session) -> Vec<i64> {
    session.items().iter().map(|i| i.id).collect()
  }

  #[tokio::test]
  async fn test_refresh_loads_first_page() {
    let source = MockSource::new().with_page(1, vec![anime(1, 1), anime(2, 2)], true);
    let (mut session, _) = session(source, true);

    assert!(matches!(session.state(), LoadState::Idle));
    session.refresh(false);
    assert!(session.state().is_loading());

    assert!(session.next_update().await);
    assert_eq!(ids(&session), vec![1, 2]);
    assert_eq!(session.current_page(), 1);
    assert!(session.has_next_page());
    assert!(!session.is_offline());
  }

  #[tokio::test]
  async fn test_next_page_drops_overlapping_ids() {
    let source = MockSource::new()
      .with_page(1, vec![anime(1, 1), anime(2, 2), anime(3, 3)], true)
      .with_page(2, vec![anime(3, 30), anime(4, 4), anime(4, 40), anime(5, 5)], false);
    let (mut session, _) = session(source, true);

    session.refresh(false);
    session.next_update().await;
    session.load_next_page();
    assert!(session.is_loading_more());
    session.next_update().await;

    assert_eq!(ids(&session), vec![1, 2, 3, 4, 5]);
    // The page-1 copy of id 3 is the one kept
    assert_eq!(session.items()[2].rank, Some(3));
    assert_eq!(session.items()[3].rank, Some(4));
    assert_eq!(session.current_page(), 2);
    assert!(!session.has_next_page());
    assert!(!session.is_loading_more());
  }

  #[tokio::test]
  async fn test_load_next_page_guards() {
    let source = MockSource::new()
      .with_page(1, vec![anime(1, 1)], true)
      .with_page(2, vec![anime(2, 2)], false)
      .with_delay(2, Duration::from_millis(50));
    let (mut session, _) = session(source, true);

    // Not loaded yet
    session.load_next_page();
    assert!(!session.is_loading_more());

    session.refresh(false);
    session.next_update().await;

    session.load_next_page();
    session.load_next_page();
    session.next_update().await;
    assert_eq!(session.client.source().list_calls.load(Ordering::SeqCst), 2);

    // No more pages
    session.load_next_page();
    assert!(!session.is_loading_more());
    assert_eq!(session.client.source().list_calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_pagination_cache_fallback_ends_list() {
    let source = MockSource::new().with_page(1, vec![anime(1, 1), anime(2, 2)], true);
    let (mut session, _) = session(source, true);

    session.refresh(false);
    session.next_update().await;

    // The source has no page 2, so the cache answers with what it has:
    // page 1 items, which are already in the list
    session.load_next_page();
    session.next_update().await;

    assert!(session.state().is_success());
    assert!(!session.pagination_failed());
    assert_eq!(ids(&session), vec![1, 2]);
    assert_eq!(session.current_page(), 1);
    assert!(!session.has_next_page());
    assert!(!session.is_loading_more());
  }

  #[tokio::test]
  async fn test_pagination_failure_sets_flag_and_retry_recovers() {
    let source = MockSource::new()
      .with_page(1, vec![anime(1, 1)], true)
      .with_page(2, vec![anime(2, 2)], false);
    let (mut session, _) = session(source, true);

    session.refresh(false);
    session.next_update().await;

    session.client.source().set_failing(true);
    session.client.cache().clear_all().await.unwrap();
    session.load_next_page();
    session.next_update().await;

    assert!(session.pagination_failed());
    assert!(session.state().is_success());
    assert_eq!(ids(&session), vec![1]);
    assert_eq!(session.current_page(), 1);

    session.client.source().set_failing(false);
    session.retry_next_page();
    assert!(!session.pagination_failed());
    session.next_update().await;

    assert_eq!(ids(&session), vec![1, 2]);
    assert_eq!(session.current_page(), 2);
  }

  #[tokio::test]
  async fn test_main_failure_is_error_state() {
    let (mut session, _) = session(MockSource::new(), false);

    session.refresh(false);
    session.next_update().await;

    assert_eq!(
      session.state().error(),
      Some("No internet connection and no cached data available")
    );
    assert!(session.is_offline());
    assert!(session.items().is_empty());
    assert!(!session.pagination_failed());
  }

  #[tokio::test]
  async fn test_reconnect_refreshes_after_main_error() {
    let source = MockSource::new().with_page(1, vec![anime(1, 1)], true);
    let (mut session, connectivity) = session(source, false);

    session.refresh(false);
    session.next_update().await;
    assert!(session.state().is_error());

    connectivity.set_available(true);
    session.next_update().await; // connectivity change triggers a refresh
    assert!(!session.is_offline());
    assert!(session.state().is_loading());

    session.next_update().await;
    assert_eq!(ids(&session), vec![1]);
  }

  #[tokio::test]
  async fn test_reconnect_does_not_retry_failed_pagination() {
    let source = MockSource::new()
      .with_page(1, vec![anime(1, 1)], true)
      .with_page(2, vec![anime(2, 2)], false);
    let (mut session, connectivity) = session(source, true);

    session.refresh(false);
    session.next_update().await;

    session.client.source().set_failing(true);
    session.client.cache().clear_all().await.unwrap();
    session.load_next_page();
    session.next_update().await;
    assert!(session.pagination_failed());

    session.client.source().set_failing(false);
    connectivity.set_available(false);
    connectivity.set_available(true);
    tokio::time::sleep(Duration::from_millis(10)).await;
    session.poll();

    assert!(session.pagination_failed());
    assert!(!session.is_loading_more());
    assert_eq!(session.client.source().list_calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_refresh_discards_stale_results() {
    let source = MockSource::new()
      .with_page(1, vec![anime(1, 1)], true)
      .with_delay(1, Duration::from_millis(50));
    let (mut session, _) = session(source, true);

    session.refresh(false);
    tokio::time::sleep(Duration::from_millis(10)).await;
    session.client.source().set_page(1, vec![anime(9, 1)], true);
    session.refresh(false);

    session.next_update().await;
    assert_eq!(ids(&session), vec![9]);

    // The first request was aborted; nothing else arrives
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!session.poll());
    assert_eq!(ids(&session), vec![9]);
  }

  #[tokio::test]
  async fn test_refresh_cancels_pagination() {
    let source = MockSource::new()
      .with_page(1, vec![anime(1, 1)], true)
      .with_page(2, vec![anime(2, 2)], true)
      .with_delay(2, Duration::from_millis(50));
    let (mut session, _) = session(source, true);

    session.refresh(false);
    session.next_update().await;
    session.load_next_page();
    assert!(session.is_loading_more());

    session.refresh(true);
    assert!(!session.is_loading_more());
    session.next_update().await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    session.poll();
    assert_eq!(ids(&session), vec![1]);
    assert_eq!(session.current_page(), 1);
  }

  #[tokio::test]
  async fn test_poll_applies_completed_work() {
    let source = MockSource::new().with_page(1, vec![anime(1, 1)], false);
    let (mut session, _) = session(source, true);

    session.refresh(false);
    assert!(!session.poll());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(session.poll());
    assert_eq!(ids(&session), vec![1]);
  }

  #[tokio::test]
  async fn test_offline_refresh_serves_cache_as_last_page() {
    let source = MockSource::new()
      .with_page(1, vec![anime(1, 1)], true)
      .with_page(2, vec![anime(2, 2)], true);
    let (mut session, connectivity) = session(source, true);

    session.refresh(false);
    session.next_update().await;
    session.load_next_page();
    session.next_update().await;

    connectivity.set_available(false);
    session.next_update().await;
    assert!(session.is_offline());

    session.refresh(false);
    session.next_update().await;
    assert_eq!(ids(&session), vec![1]);
    assert_eq!(session.current_page(), 2);
    assert!(!session.has_next_page());
  }

  #[tokio::test]
  async fn test_cancelled_force_refresh_keeps_offline_fallback() {
    // Cancelled mid-write the old page 1 survives; cancelled after the write
    // the new one is already in place. The cache is never left empty.
    for (cancel_after, expected) in [(10, vec![1, 2]), (45, vec![10])] {
      let source = MockSource::new()
        .with_page(1, vec![anime(1, 1), anime(2, 2)], true)
        .with_page(2, vec![anime(3, 3), anime(4, 4)], true);
      let store = RecordingStore::new().with_op_delay(Duration::from_millis(30));
      let client = Arc::new(CachedJikanClient::new(
        source,
        store,
        Arc::new(ManualConnectivity::new(true)),
      ));
      let mut session = PageAccumulator::new(Arc::clone(&client));

      session.refresh(false);
      session.next_update().await;
      session.load_next_page();
      session.next_update().await;
      assert_eq!(ids_of(session.items()), vec![1, 2, 3, 4]);

      client.source().set_page(1, vec![anime(10, 1)], true);
      session.refresh(true);
      tokio::time::sleep(Duration::from_millis(cancel_after)).await;

      client.source().set_failing(true);
      session.refresh(false);
      session.next_update().await;

      assert!(
        session.state().is_success(),
        "cache emptied after cancelling at {}ms: {:?}",
        cancel_after,
        session.state().error()
      );
      assert_eq!(ids_of(session.items()), expected);
    }
  }

  fn ids_of(items: &[ListItem]) -> Vec<i64> {
    items.iter().map(|i| i.id).collect()
  }
}
