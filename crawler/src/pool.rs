//! Fixed pool of connection workers.

use crate::dialer::{random_below, DialOutcome, Dialer};
use crate::shutdown::Shutdown;
use dht_peers_network::{Host, PeerAddressInfo};
use log::debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// A fixed number of workers draining the pending work queue.
///
/// Each worker handles one peer at a time, so no more than the worker count
/// of dials are ever in progress. Workers exit when the queue is closed and
/// empty, when the shutdown signal is raised, or when the discovered peers
/// receiver is dropped.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `workers` workers sharing `queue`.
    ///
    /// Every dial is preceded by a random delay in `[0, max_jitter)`, so a
    /// burst of discoveries from one traversal is spread out over time.
    pub fn spawn<H: Host>(
        workers: usize,
        queue: mpsc::Receiver<PeerAddressInfo>,
        dialer: Dialer<H>,
        max_jitter: Duration,
        shutdown: Shutdown,
    ) -> Self {
        let queue = Arc::new(Mutex::new(queue));
        let handles = (0..workers)
            .map(|worker| {
                let queue = queue.clone();
                let dialer = dialer.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    work(worker, queue, dialer, max_jitter, shutdown).await;
                })
            })
            .collect();

        WorkerPool { handles }
    }

    /// Number of workers spawned.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Wait for every worker to exit.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                if e.is_panic() {
                    std::panic::resume_unwind(e.into_panic());
                }
            }
        }
    }
}

async fn work<H: Host>(
    worker: usize,
    queue: Arc<Mutex<mpsc::Receiver<PeerAddressInfo>>>,
    dialer: Dialer<H>,
    max_jitter: Duration,
    shutdown: Shutdown,
) {
    loop {
        let next = shutdown
            .run(async { queue.lock().await.recv().await })
            .await;
        let info = match next {
            Some(Some(info)) => info,
            Some(None) => {
                debug!("Work queue closed, worker {worker} exiting");
                return;
            }
            None => {
                debug!("Worker {worker} shutting down");
                return;
            }
        };

        if !shutdown.sleep(random_below(max_jitter)).await {
            debug!("Worker {worker} shutting down");
            return;
        }

        match dialer.try_connect(info).await {
            DialOutcome::Cancelled => {
                debug!("Worker {worker} shutting down");
                return;
            }
            DialOutcome::ConsumerGone => {
                debug!("Discovered peers receiver dropped, worker {worker} stopping");
                return;
            }
            DialOutcome::Connected {
                attempts,
                live_connections,
            } => debug!(
                "Worker {worker} connected after {attempts} attempts, {live_connections} live connections"
            ),
            DialOutcome::BackoffExhausted { attempts } | DialOutcome::Failed { attempts } => {
                debug!("Worker {worker} dropped peer after {attempts} attempts")
            }
        }
    }
}
