//! Error types for the data access layer.
//!
//! Every failure that can happen while talking to the remote API or the local
//! cache is folded into [`Error`] so callers only ever see a `Result`.

/// Errors returned by the remote source, the cache store and the client.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
  /// Remote unreachable, timed out, or answered with a non-success status.
  #[error("Network error: {0}")]
  Network(String),

  /// Remote answered but the payload could not be decoded.
  #[error("Malformed response: {0}")]
  Decode(String),

  /// Cache read or write failed.
  #[error("Cache error: {0}")]
  Storage(String),

  /// No connectivity (or the network call failed) and nothing cached.
  #[error("No internet connection and no cached data available")]
  NoDataAvailable,

  /// Invalid client configuration (e.g. an unparsable base URL).
  #[error("Invalid configuration: {0}")]
  Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<rusqlite::Error> for Error {
  fn from(err: rusqlite::Error) -> Self {
    Error::Storage(err.to_string())
  }
}

impl From<serde_json::Error> for Error {
  fn from(err: serde_json::Error) -> Self {
    Error::Decode(err.to_string())
  }
}

impl From<tokio::task::JoinError> for Error {
  fn from(err: tokio::task::JoinError) -> Self {
    Error::Storage(format!("cache task failed: {}", err))
  }
}
