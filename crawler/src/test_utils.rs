//! Scripted DHT and host collaborators for testing the crawler.

use dht_peers_network::{Dht, DhtError, DialError, Host, PeerAddressInfo, PeerId};
use std::collections::{HashMap, HashSet, VecDeque};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Short peer identity for tests.
pub fn peer(byte: u8) -> PeerId {
    PeerId::from_bytes(vec![byte])
}

/// Address info the mock DHT resolves `id` to.
pub fn info(byte: u8) -> PeerAddressInfo {
    PeerAddressInfo::new(peer(byte)).with_addresses(vec![address(byte)])
}

fn address(byte: u8) -> SocketAddr {
    SocketAddr::new(Ipv4Addr::new(10, 0, 0, byte).into(), 4001)
}

/// What the mock DHT knows about one peer.
#[derive(Debug, Clone, Default)]
struct MockPeer {
    /// Whether resolution succeeds.
    resolvable: bool,
    /// Connected peers, or `None` if listing them fails.
    neighbours: Option<Vec<PeerId>>,
}

/// Mock DHT over a hand-built connectivity graph.
///
/// Unknown peers fail resolution with [`DhtError::NotFound`].
#[derive(Debug, Default)]
pub struct MockDht {
    /// One-shot errors returned by the next closest peers lookups.
    closest_errors: Mutex<VecDeque<DhtError>>,
    /// Result of every closest peers lookup once the errors are used up.
    closest: Mutex<Vec<PeerId>>,
    peers: Mutex<HashMap<PeerId, MockPeer>>,
    /// Never answer any lookup.
    stalled: AtomicBool,
    /// Never answer lookups about these peers.
    stalled_peers: Mutex<HashSet<PeerId>>,
    /// Never answer connected peer listings of these peers.
    stalled_expansions: Mutex<HashSet<PeerId>>,
    closest_calls: AtomicUsize,
    resolve_calls: Mutex<HashMap<PeerId, usize>>,
    connected_calls: Mutex<HashMap<PeerId, usize>>,
}

impl MockDht {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the result of closest peers lookups.
    pub fn set_closest(&self, ids: Vec<PeerId>) {
        *self.closest.lock().unwrap() = ids;
    }

    /// Fail the next closest peers lookup.
    pub fn push_closest_error(&self, error: DhtError) {
        self.closest_errors.lock().unwrap().push_back(error);
    }

    /// Add a resolvable peer connected to `neighbours`.
    pub fn add_peer(&self, id: PeerId, neighbours: Vec<PeerId>) {
        self.peers.lock().unwrap().insert(
            id,
            MockPeer {
                resolvable: true,
                neighbours: Some(neighbours),
            },
        );
    }

    /// Add a peer whose resolution fails, as stale DHT entries do.
    pub fn add_unresolvable(&self, id: PeerId) {
        self.peers.lock().unwrap().insert(id, MockPeer::default());
    }

    /// Add a peer which resolves but whose connected peers can't be listed.
    pub fn add_unexpandable(&self, id: PeerId) {
        self.peers.lock().unwrap().insert(
            id,
            MockPeer {
                resolvable: true,
                neighbours: None,
            },
        );
    }

    /// Make every lookup hang forever.
    pub fn stall(&self) {
        self.stalled.store(true, Ordering::SeqCst);
    }

    /// Make resolution and connected peer listing of `id` hang forever.
    pub fn stall_peer(&self, id: PeerId) {
        self.stalled_peers.lock().unwrap().insert(id);
    }

    /// Make connected peer listing of `id` hang forever.
    pub fn stall_expansion(&self, id: PeerId) {
        self.stalled_expansions.lock().unwrap().insert(id);
    }

    pub fn closest_calls(&self) -> usize {
        self.closest_calls.load(Ordering::SeqCst)
    }

    pub fn resolve_calls(&self, id: &PeerId) -> usize {
        self.resolve_calls.lock().unwrap().get(id).copied().unwrap_or(0)
    }

    pub fn connected_calls(&self, id: &PeerId) -> usize {
        self.connected_calls
            .lock()
            .unwrap()
            .get(id)
            .copied()
            .unwrap_or(0)
    }

    /// Total resolve and connected-to lookups across all peers.
    pub fn peer_lookups(&self) -> usize {
        let resolves: usize = self.resolve_calls.lock().unwrap().values().sum();
        let expansions: usize = self.connected_calls.lock().unwrap().values().sum();
        resolves + expansions
    }

    async fn stall_if_needed(&self) {
        if self.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
    }

    async fn stall_peer_if_needed(&self, id: &PeerId, expansion: bool) {
        let stalled = self.stalled_peers.lock().unwrap().contains(id)
            || (expansion && self.stalled_expansions.lock().unwrap().contains(id));
        if stalled {
            std::future::pending::<()>().await;
        }
    }

    fn lookup(&self, id: &PeerId) -> Option<MockPeer> {
        self.peers.lock().unwrap().get(id).cloned()
    }
}

impl Dht for MockDht {
    async fn closest_peers(&self, _key: &str) -> Result<Vec<PeerId>, DhtError> {
        self.closest_calls.fetch_add(1, Ordering::SeqCst);
        self.stall_if_needed().await;
        if let Some(error) = self.closest_errors.lock().unwrap().pop_front() {
            return Err(error);
        }
        Ok(self.closest.lock().unwrap().clone())
    }

    async fn resolve_peer(&self, id: &PeerId) -> Result<PeerAddressInfo, DhtError> {
        *self
            .resolve_calls
            .lock()
            .unwrap()
            .entry(id.clone())
            .or_insert(0) += 1;
        self.stall_if_needed().await;
        self.stall_peer_if_needed(id, false).await;
        match self.lookup(id) {
            Some(peer) if peer.resolvable => Ok(info(id.as_bytes()[0])),
            _ => Err(DhtError::NotFound),
        }
    }

    async fn peers_connected_to(&self, id: &PeerId) -> Result<Vec<PeerAddressInfo>, DhtError> {
        *self
            .connected_calls
            .lock()
            .unwrap()
            .entry(id.clone())
            .or_insert(0) += 1;
        self.stall_if_needed().await;
        self.stall_peer_if_needed(id, true).await;
        match self.lookup(id).and_then(|peer| peer.neighbours) {
            Some(neighbours) => Ok(neighbours.iter().map(|n| info(n.as_bytes()[0])).collect()),
            None => Err(DhtError::Protocol("connected peers unavailable".to_string())),
        }
    }
}

/// Mock host with scripted dial results.
///
/// Peers without a script connect successfully.
#[derive(Debug, Default)]
pub struct MockHost {
    /// Results returned by successive dials of a peer.
    scripts: Mutex<HashMap<PeerId, VecDeque<Result<(), DialError>>>>,
    /// Peers that are permanently in dial backoff.
    backoff: Mutex<HashSet<PeerId>>,
    /// Peers that never show a live connection.
    no_live_connections: Mutex<HashSet<PeerId>>,
    live: Mutex<HashMap<PeerId, usize>>,
    attempts: Mutex<HashMap<PeerId, usize>>,
    /// Simulated time a dial takes.
    dial_time: Mutex<Duration>,
    stalled: AtomicBool,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a result for the next dial of `id`.
    pub fn push_result(&self, id: PeerId, result: Result<(), DialError>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(id)
            .or_default()
            .push_back(result);
    }

    /// Answer every dial of `id` with [`DialError::Backoff`].
    pub fn always_backoff(&self, id: PeerId) {
        self.backoff.lock().unwrap().insert(id);
    }

    /// Report zero live connections to `id` even after it connects.
    pub fn hide_connections(&self, id: PeerId) {
        self.no_live_connections.lock().unwrap().insert(id);
    }

    pub fn set_dial_time(&self, dial_time: Duration) {
        *self.dial_time.lock().unwrap() = dial_time;
    }

    /// Make every dial hang forever.
    pub fn stall(&self) {
        self.stalled.store(true, Ordering::SeqCst);
    }

    pub fn attempts(&self, id: &PeerId) -> usize {
        self.attempts.lock().unwrap().get(id).copied().unwrap_or(0)
    }

    pub fn total_attempts(&self) -> usize {
        self.attempts.lock().unwrap().values().sum()
    }

    /// Highest number of dials that were in progress at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_result(&self, id: &PeerId) -> Result<(), DialError> {
        *self.attempts.lock().unwrap().entry(id.clone()).or_insert(0) += 1;
        if self.backoff.lock().unwrap().contains(id) {
            return Err(DialError::Backoff);
        }
        self.scripts
            .lock()
            .unwrap()
            .get_mut(id)
            .and_then(|script| script.pop_front())
            .unwrap_or(Ok(()))
    }
}

impl Host for MockHost {
    async fn connect(&self, info: &PeerAddressInfo) -> Result<(), DialError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if self.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let dial_time = *self.dial_time.lock().unwrap();
        if !dial_time.is_zero() {
            tokio::time::sleep(dial_time).await;
        }

        let result = self.next_result(&info.id);
        if result.is_ok() && !self.no_live_connections.lock().unwrap().contains(&info.id) {
            self.live.lock().unwrap().insert(info.id.clone(), 1);
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn live_connections_to(&self, id: &PeerId) -> usize {
        self.live.lock().unwrap().get(id).copied().unwrap_or(0)
    }
}
