//! Crawler-wide cooperative cancellation.
//!
//! Every suspension point of a crawl races its future against a [`Shutdown`]
//! listener, so raising the signal stops sleeps, lookups and dials promptly
//! instead of after their time bound.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Create a connected trigger and listener pair.
pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx: Arc::new(tx) }, Shutdown { rx })
}

/// Raises the shutdown signal for every [`Shutdown`] listener.
#[derive(Debug, Clone)]
pub struct ShutdownTrigger {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownTrigger {
    /// Raise the signal. Raising it more than once is harmless.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

/// Listens for the shutdown signal.
///
/// The signal also counts as raised once every [`ShutdownTrigger`] is gone,
/// since nothing could ever stop the crawl otherwise.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// Returns `true` if the signal has been raised.
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Wait until the signal is raised.
    pub async fn wait(&self) {
        let mut rx = self.rx.clone();
        // An error means all triggers were dropped.
        let _ = rx.wait_for(|triggered| *triggered).await;
    }

    /// Drive `future` to completion unless the signal is raised first.
    ///
    /// # Returns
    ///
    /// * `Some(output)` - The future completed.
    /// * `None` - The signal was raised, the future was dropped.
    pub async fn run<F: Future>(&self, future: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            _ = self.wait() => None,
            output = future => Some(output),
        }
    }

    /// Sleep for `duration` unless the signal is raised first.
    ///
    /// Returns `true` if the full duration elapsed.
    pub async fn sleep(&self, duration: Duration) -> bool {
        self.run(tokio::time::sleep(duration)).await.is_some()
    }
}
