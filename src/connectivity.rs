//! Network reachability.
//!
//! The client only needs two things from the platform: an instant yes/no
//! answer, and a stream of transitions to react to connectivity coming back.

use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::ConnectivityConfig;

/// Reports whether the network is reachable.
pub trait ConnectivityOracle: Send + Sync {
  /// Current reachability. Must not block or perform I/O.
  fn is_available(&self) -> bool;

  /// Stream of reachability states for one subscriber.
  ///
  /// Yields the current state immediately, then every change. The same
  /// state is never yielded twice in a row.
  fn observe_changes(&self) -> BoxStream<'static, bool>;
}

impl<T: ConnectivityOracle + ?Sized> ConnectivityOracle for Arc<T> {
  fn is_available(&self) -> bool {
    (**self).is_available()
  }

  fn observe_changes(&self) -> BoxStream<'static, bool> {
    (**self).observe_changes()
  }
}

/// Turn a watch receiver into a deduplicated state stream.
///
/// Ends when the sender is dropped.
fn distinct_states(rx: watch::Receiver<bool>) -> BoxStream<'static, bool> {
  stream::unfold((rx, None), |(mut rx, last)| async move {
    loop {
      let current = *rx.borrow_and_update();
      if last != Some(current) {
        return Some((current, (rx, Some(current))));
      }
      if rx.changed().await.is_err() {
        return None;
      }
    }
  })
  .boxed()
}

/// Connectivity that is set by hand.
///
/// Backs `--offline` and lets callers simulate the network going away.
#[derive(Debug)]
pub struct ManualConnectivity {
  tx: watch::Sender<bool>,
}

impl ManualConnectivity {
  pub fn new(available: bool) -> Self {
    let (tx, _rx) = watch::channel(available);
    Self { tx }
  }

  pub fn set_available(&self, available: bool) {
    let previous = self.tx.send_replace(available);
    if previous != available {
      debug!(available, "connectivity changed");
    }
  }
}

impl ConnectivityOracle for ManualConnectivity {
  fn is_available(&self) -> bool {
    *self.tx.borrow()
  }

  fn observe_changes(&self) -> BoxStream<'static, bool> {
    distinct_states(self.tx.subscribe())
  }
}

/// Connectivity derived from periodic TCP connects to a known host.
///
/// The probe loop runs until this value is dropped.
pub struct ProbeConnectivity {
  rx: watch::Receiver<bool>,
  task: JoinHandle<()>,
}

impl ProbeConnectivity {
  /// Probe once, then keep probing in the background.
  pub async fn start(config: &ConnectivityConfig) -> Self {
    let host = config.probe_host.clone();
    let port = config.probe_port;
    let interval = Duration::from_secs(config.probe_interval_secs.max(1));
    let timeout = Duration::from_secs(config.probe_timeout_secs.max(1));

    let initial = probe(&host, port, timeout).await;
    info!(host = %host, port, available = initial, "connectivity probe started");

    let (tx, rx) = watch::channel(initial);
    let task = tokio::spawn(async move {
      let mut ticker = tokio::time::interval(interval);
      ticker.tick().await;
      loop {
        ticker.tick().await;
        let available = probe(&host, port, timeout).await;
        let previous = tx.send_replace(available);
        if previous != available {
          info!(available, "connectivity changed");
        }
      }
    });

    Self { rx, task }
  }
}

impl ConnectivityOracle for ProbeConnectivity {
  fn is_available(&self) -> bool {
    *self.rx.borrow()
  }

  fn observe_changes(&self) -> BoxStream<'static, bool> {
    distinct_states(self.rx.clone())
  }
}

impl Drop for ProbeConnectivity {
  fn drop(&mut self) {
    self.task.abort();
  }
}

async fn probe(host: &str, port: u16, timeout: Duration) -> bool {
  matches!(
    tokio::time::timeout(timeout, TcpStream::connect((host, port))).await,
    Ok(Ok(_))
  )
}
