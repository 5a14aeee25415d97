use crate::dialer::Dialer;
use crate::pool::WorkerPool;
use crate::session::{CrawlSession, SessionConfig};
use crate::shutdown::{self, ShutdownTrigger};
use crate::stats::{CrawlStats, StatsSnapshot};
use crate::traversal::Traversal;
use dht_peers_network::{Dht, DhtError, Host, PeerAddressInfo};
use log::debug;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Errors that end a crawl.
#[derive(Debug)]
pub enum CrawlError {
    /// No secure random bytes were available for an anchor key.
    Randomness(rand::Error),
    /// A closest peers lookup failed under [`LookupFailurePolicy::Abort`].
    ///
    /// [`LookupFailurePolicy::Abort`]: crate::LookupFailurePolicy::Abort
    ClosestPeers(DhtError),
}

impl fmt::Display for CrawlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrawlError::Randomness(err) => write!(f, "Unable to generate anchor key: {err}"),
            CrawlError::ClosestPeers(err) => write!(f, "Closest peers lookup failed: {err}"),
        }
    }
}

impl Error for CrawlError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CrawlError::Randomness(err) => Some(err),
            CrawlError::ClosestPeers(err) => Some(err),
        }
    }
}

/// A crawler for a DHT-based peer-to-peer overlay.
///
/// The crawler repeatedly looks up the peers closest to a random key, walks
/// the "connected to" graph outward from them, and connects to every peer it
/// finds for the first time.
///
/// A crawler runs a single crawl. [`Crawler::crawl`] consumes it, so the set
/// of visited peers lives exactly as long as the crawler itself and a peer is
/// never dialed twice.
///
/// ```compile_fail
/// # use dht_peers_crawler::{CrawlerBuilder, Dht, DhtError, DialError, Host, PeerAddressInfo, PeerId};
/// # struct Overlay;
/// # impl Dht for Overlay {
/// #     async fn closest_peers(&self, _key: &str) -> Result<Vec<PeerId>, DhtError> { Ok(vec![]) }
/// #     async fn resolve_peer(&self, _id: &PeerId) -> Result<PeerAddressInfo, DhtError> { Err(DhtError::NotFound) }
/// #     async fn peers_connected_to(&self, _id: &PeerId) -> Result<Vec<PeerAddressInfo>, DhtError> { Ok(vec![]) }
/// # }
/// # impl Host for Overlay {
/// #     async fn connect(&self, _info: &PeerAddressInfo) -> Result<(), DialError> { Ok(()) }
/// #     fn live_connections_to(&self, _id: &PeerId) -> usize { 0 }
/// # }
/// # async fn run() {
/// let crawler = CrawlerBuilder::new().build(Overlay, Overlay);
/// let first = crawler.crawl();
/// // The crawler is gone, a second crawl would start from an empty visited set.
/// let second = crawler.crawl();
/// # }
/// ```
pub struct Crawler<D, H> {
    config: SessionConfig,
    dht: Arc<D>,
    host: Arc<H>,
}

impl<D: Dht, H: Host> Crawler<D, H> {
    pub(crate) fn new(config: SessionConfig, dht: Arc<D>, host: Arc<H>) -> Self {
        Crawler { config, dht, host }
    }

    /// Start crawling.
    ///
    /// Spawns the connection workers and the crawl loop, and returns a handle
    /// that receives every successfully connected peer. The visited set is
    /// created here and kept for the crawl's whole lifetime, so a peer is
    /// dialed at most once.
    ///
    /// # Termination
    ///
    /// * **Shutdown** - [`CrawlHandle::shutdown`] or [`CrawlHandle::join`] is
    ///   called, or the handle is dropped.
    /// * **Round limit** - The configured number of rounds has run. Queued
    ///   peers are still dialed before the workers exit.
    /// * **Fatal error** - Reported by [`CrawlHandle::join`].
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn crawl(self) -> CrawlHandle {
        let (trigger, shutdown) = shutdown::channel();
        let stats = Arc::new(CrawlStats::default());
        // Pending work is sized to the pool, the traversal waits on slow workers.
        let (work_tx, work_rx) = mpsc::channel(self.config.workers);
        let (discovered_tx, discovered_rx) = mpsc::channel(self.config.discovered_capacity);

        let dialer = Dialer::new(
            self.host,
            self.config.dial_policy.clone(),
            discovered_tx,
            shutdown.clone(),
            stats.clone(),
        );
        let workers = WorkerPool::spawn(
            self.config.workers,
            work_rx,
            dialer,
            self.config.max_dial_jitter,
            shutdown.clone(),
        );

        let traversal = Traversal::new(
            self.dht,
            work_tx,
            shutdown.clone(),
            self.config.lookup_timeout,
            stats.clone(),
        );
        let session = CrawlSession::new(
            self.config,
            traversal,
            shutdown,
            trigger.clone(),
            stats.clone(),
        );
        debug!("Starting crawl with {} workers", workers.len());
        let task = tokio::spawn(session.run());

        CrawlHandle {
            discovered: discovered_rx,
            trigger,
            task: Some(task),
            workers: Some(workers),
            stats,
        }
    }
}

/// Handle to a running crawl.
///
/// Dropping the handle shuts the crawl down.
pub struct CrawlHandle {
    discovered: mpsc::Receiver<PeerAddressInfo>,
    trigger: ShutdownTrigger,
    task: Option<JoinHandle<Result<(), CrawlError>>>,
    workers: Option<WorkerPool>,
    stats: Arc<CrawlStats>,
}

impl CrawlHandle {
    /// Receive the next successfully connected peer.
    ///
    /// Returns `None` once every connection worker has exited.
    pub async fn recv(&mut self) -> Option<PeerAddressInfo> {
        self.discovered.recv().await
    }

    /// Signal the crawl loop, any in-flight traversal and all workers to stop.
    pub fn shutdown(&self) {
        self.trigger.trigger();
    }

    /// Current crawl counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Stop the crawl, wait for it to end and report how it ended.
    ///
    /// Raises the shutdown signal and stops accepting discovered peers, so
    /// peers still being dialed are not reported. Drain [`CrawlHandle::recv`]
    /// beforehand to receive every peer of a bounded crawl.
    pub async fn join(mut self) -> Result<(), CrawlError> {
        self.trigger.trigger();
        self.discovered.close();

        let result = match self.task.take() {
            Some(task) => match task.await {
                Ok(result) => result,
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(_) => Ok(()),
            },
            None => Ok(()),
        };

        if let Some(workers) = self.workers.take() {
            workers.join().await;
        }
        result
    }
}

impl Drop for CrawlHandle {
    fn drop(&mut self) {
        self.trigger.trigger();
    }
}
