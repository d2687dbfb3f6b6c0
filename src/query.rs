//! Load state and cancellable background fetches.
//!
//! [`LoadState`] is what a screen renders: idle, a spinner, data, or an
//! error message. [`Task`] runs one fetch on the runtime and hands its result
//! back exactly once; dropping the task aborts the fetch and guarantees the
//! result is never observed.
//!
//! # Example
//!
//! ```ignore
//! let client = client.clone();
//! let mut task = Task::spawn(async move { client.fetch_detail(5114).await });
//!
//! // In event loop tick
//! if let Some(result) = task.try_take() {
//!     state = LoadState::from_result(result);
//! }
//! ```

use std::fmt::Display;
use std::future::Future;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// The state of a load
#[derive(Debug, Clone, PartialEq)]
pub enum LoadState<T> {
  /// Nothing requested yet
  Idle,
  /// A fetch is in flight
  Loading,
  /// Fetch completed successfully
  Success(T),
  /// Fetch failed; carries a message fit for display
  Error(String),
}

impl<T> LoadState<T> {
  pub fn from_result(result: Result<T, String>) -> Self {
    match result {
      Ok(data) => LoadState::Success(data),
      Err(message) => LoadState::Error(message),
    }
  }

  pub fn is_loading(&self) -> bool {
    matches!(self, LoadState::Loading)
  }

  pub fn is_success(&self) -> bool {
    matches!(self, LoadState::Success(_))
  }

  pub fn is_error(&self) -> bool {
    matches!(self, LoadState::Error(_))
  }

  pub fn data(&self) -> Option<&T> {
    match self {
      LoadState::Success(data) => Some(data),
      _ => None,
    }
  }

  pub fn error(&self) -> Option<&str> {
    match self {
      LoadState::Error(e) => Some(e),
      _ => None,
    }
  }
}

/// A fetch running on the runtime.
///
/// Aborted on drop.
#[derive(Debug)]
pub struct Task<T> {
  receiver: oneshot::Receiver<Result<T, String>>,
  handle: JoinHandle<()>,
}

impl<T: Send + 'static> Task<T> {
  /// Spawn `future`, converting its error into a display message.
  pub fn spawn<Fut, E>(future: Fut) -> Self
  where
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    E: Display,
  {
    let (tx, receiver) = oneshot::channel();
    let handle = tokio::spawn(async move {
      let result = future.await.map_err(|e| e.to_string());
      // Ignore send errors - receiver may have been dropped
      let _ = tx.send(result);
    });
    Self { receiver, handle }
  }

  /// Take the result if the fetch has finished, without waiting.
  pub fn try_take(&mut self) -> Option<Result<T, String>> {
    match self.receiver.try_recv() {
      Ok(result) => Some(result),
      Err(oneshot::error::TryRecvError::Empty) => None,
      Err(oneshot::error::TryRecvError::Closed) => Some(Err(cancelled())),
    }
  }

  /// Wait for the fetch to finish.
  ///
  /// Must not be called again once it has returned.
  pub async fn wait(&mut self) -> Result<T, String> {
    (&mut self.receiver).await.unwrap_or_else(|_| Err(cancelled()))
  }
}

impl<T> Drop for Task<T> {
  fn drop(&mut self) {
    self.handle.abort();
  }
}

/// Sender dropped without sending - the task panicked or was aborted.
fn cancelled() -> String {
  "Request was cancelled".to_string()
}

/// Wait on an optional task; `None` when there is nothing in flight.
pub(crate) async fn wait_for<T: Send + 'static>(slot: &mut Option<Task<T>>) -> Option<Result<T, String>> {
  match slot {
    Some(task) => Some(task.wait().await),
    None => None,
  }
}
