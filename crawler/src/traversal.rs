//! Frontier traversal of the DHT's connectivity graph.
//!
//! A traversal starts from the peers closest to a random anchor key and walks
//! the "connected to" relation depth first, handing every newly seen peer to
//! the connection workers.

use crate::anchor::AnchorKey;
use crate::shutdown::Shutdown;
use crate::stats::CrawlStats;
use crate::visited::VisitedSet;
use dht_peers_network::{Dht, DhtError, PeerAddressInfo, PeerId};
use log::debug;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

/// Work done by one traversal call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraversalSummary {
    /// Peers returned by the closest peers lookup.
    pub closest: usize,
    /// Peers seen for the first time.
    pub visited: usize,
    /// Peers resolved and submitted for connection.
    pub queued: usize,
    /// Peers abandoned because they could not be resolved.
    pub unresolved: usize,
}

impl TraversalSummary {
    fn absorb(&mut self, other: TraversalSummary) {
        self.visited += other.visited;
        self.queued += other.queued;
        self.unresolved += other.unresolved;
    }
}

impl fmt::Display for TraversalSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} closest peers, {} new peers visited, {} queued, {} unresolved",
            self.closest, self.visited, self.queued, self.unresolved
        )
    }
}

/// How a traversal call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalOutcome {
    /// Every reachable unvisited peer was processed.
    Completed(TraversalSummary),
    /// The shutdown signal stopped the traversal part way.
    Cancelled,
}

/// Result of processing a single peer.
enum Expansion {
    /// Peers connected to the processed peer, in the order the DHT listed them.
    Neighbours(Vec<PeerAddressInfo>),
    /// Nothing further to walk from this peer.
    Leaf,
    Cancelled,
}

/// Depth-first walker over the peers the DHT knows about.
///
/// The traversal owns the [`VisitedSet`] and is its only writer. It is meant
/// to run on a single task: rounds and sibling peers are processed one after
/// the other, never in parallel.
pub struct Traversal<D> {
    dht: Arc<D>,
    visited: VisitedSet,
    /// Bounded queue feeding the connection workers.
    work_tx: mpsc::Sender<PeerAddressInfo>,
    shutdown: Shutdown,
    lookup_timeout: Duration,
    stats: Arc<CrawlStats>,
}

impl<D: Dht> Traversal<D> {
    pub fn new(
        dht: Arc<D>,
        work_tx: mpsc::Sender<PeerAddressInfo>,
        shutdown: Shutdown,
        lookup_timeout: Duration,
        stats: Arc<CrawlStats>,
    ) -> Self {
        Self {
            dht,
            visited: VisitedSet::new(),
            work_tx,
            shutdown,
            lookup_timeout,
            stats,
        }
    }

    /// Number of distinct peers visited over the traversal's lifetime.
    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }

    /// Crawl outward from the peers closest to `anchor`.
    ///
    /// The closest peers lookup is collected in full before any of its
    /// results is visited. The results are then visited in order, each one
    /// walked to exhaustion before the next.
    ///
    /// # Returns
    ///
    /// * `Ok(TraversalOutcome)` - The traversal finished or was cancelled.
    /// * `Err(DhtError)` - The closest peers lookup failed or timed out.
    pub async fn explore(&mut self, anchor: &AnchorKey) -> Result<TraversalOutcome, DhtError> {
        let closest = match self.bounded(self.dht.closest_peers(anchor.as_str())).await {
            Some(result) => result?,
            None => return Ok(TraversalOutcome::Cancelled),
        };
        debug!("Anchor {anchor} is closest to {} peers", closest.len());

        let mut summary = TraversalSummary {
            closest: closest.len(),
            ..TraversalSummary::default()
        };
        for id in closest {
            match self.visit(id).await {
                TraversalOutcome::Completed(visit) => summary.absorb(visit),
                TraversalOutcome::Cancelled => return Ok(TraversalOutcome::Cancelled),
            }
        }

        Ok(TraversalOutcome::Completed(summary))
    }

    /// Process `id` and, transitively, every unvisited peer connected to it.
    ///
    /// Peers already visited are skipped without any DHT call. Failures to
    /// resolve a peer or to list its connections abandon just that branch.
    pub async fn visit(&mut self, id: PeerId) -> TraversalOutcome {
        let mut summary = TraversalSummary::default();
        // Explicit stack in place of recursion, neighbours are pushed in
        // reverse so the first listed is expanded first.
        let mut pending = vec![id];

        while let Some(id) = pending.pop() {
            match self.expand(id, &mut summary).await {
                Expansion::Neighbours(neighbours) => {
                    pending.extend(neighbours.into_iter().rev().map(|info| info.id));
                }
                Expansion::Leaf => {}
                Expansion::Cancelled => return TraversalOutcome::Cancelled,
            }
        }

        TraversalOutcome::Completed(summary)
    }

    async fn expand(&mut self, id: PeerId, summary: &mut TraversalSummary) -> Expansion {
        if self.shutdown.is_triggered() {
            return Expansion::Cancelled;
        }
        if !self.visited.mark_if_new(&id) {
            return Expansion::Leaf;
        }
        summary.visited += 1;
        self.stats.peer_visited();

        let info = match self.bounded(self.dht.resolve_peer(&id)).await {
            Some(Ok(info)) => info,
            Some(Err(e)) => {
                debug!("Peer {id} not resolved: {e}");
                summary.unresolved += 1;
                self.stats.resolve_failed();
                return Expansion::Leaf;
            }
            None => return Expansion::Cancelled,
        };

        // Blocks while the workers are saturated.
        match self.shutdown.run(self.work_tx.send(info)).await {
            Some(Ok(())) => {
                summary.queued += 1;
                self.stats.peer_queued();
            }
            Some(Err(_)) => {
                debug!("Connection workers are gone, stopping traversal");
                return Expansion::Cancelled;
            }
            None => return Expansion::Cancelled,
        }

        match self.bounded(self.dht.peers_connected_to(&id)).await {
            Some(Ok(neighbours)) => {
                debug!("Peer {id} is connected to {} peers", neighbours.len());
                Expansion::Neighbours(neighbours)
            }
            Some(Err(e)) => {
                debug!("Can't find peers connected to {id}: {e}");
                self.stats.expansion_failed();
                Expansion::Leaf
            }
            None => Expansion::Cancelled,
        }
    }

    /// Run a DHT lookup under the lookup timeout and the shutdown signal.
    ///
    /// Returns `None` if the signal was raised first.
    async fn bounded<T, F>(&self, lookup: F) -> Option<Result<T, DhtError>>
    where
        F: Future<Output = Result<T, DhtError>>,
    {
        self.shutdown
            .run(timeout(self.lookup_timeout, lookup))
            .await
            .map(|result| result.unwrap_or_else(|_| Err(DhtError::Timeout)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutdown;
    use crate::test_utils::{info, peer, MockDht};

    const LOOKUP_TIMEOUT: Duration = Duration::from_secs(60);

    fn traversal(
        dht: &Arc<MockDht>,
        capacity: usize,
    ) -> (
        Traversal<MockDht>,
        mpsc::Receiver<PeerAddressInfo>,
        shutdown::ShutdownTrigger,
    ) {
        let (work_tx, work_rx) = mpsc::channel(capacity);
        let (trigger, shutdown) = shutdown::channel();
        let traversal = Traversal::new(
            dht.clone(),
            work_tx,
            shutdown,
            LOOKUP_TIMEOUT,
            Arc::new(CrawlStats::default()),
        );
        (traversal, work_rx, trigger)
    }

    fn drain(work_rx: &mut mpsc::Receiver<PeerAddressInfo>) -> Vec<PeerAddressInfo> {
        let mut queued = Vec::new();
        while let Ok(info) = work_rx.try_recv() {
            queued.push(info);
        }
        queued
    }

    fn anchor() -> AnchorKey {
        AnchorKey::generate().unwrap()
    }

    #[tokio::test]
    async fn test_unresolved_peer_is_visited_but_not_queued() {
        let dht = Arc::new(MockDht::new());
        dht.set_closest(vec![peer(0xa), peer(0xb)]);
        dht.add_peer(peer(0xa), vec![]);
        dht.add_unresolvable(peer(0xb));
        let (mut traversal, mut work_rx, _trigger) = traversal(&dht, 16);

        let outcome = traversal.explore(&anchor()).await.unwrap();

        let queued = drain(&mut work_rx);
        assert_eq!(queued, vec![info(0xa)]);
        assert_eq!(
            outcome,
            TraversalOutcome::Completed(TraversalSummary {
                closest: 2,
                visited: 2,
                queued: 1,
                unresolved: 1,
            })
        );
        assert_eq!(dht.resolve_calls(&peer(0xb)), 1);
        assert_eq!(dht.connected_calls(&peer(0xb)), 0);
        assert_eq!(traversal.visited_count(), 2);

        // Already visited, so never resolved again.
        traversal.visit(peer(0xb)).await;
        assert_eq!(dht.resolve_calls(&peer(0xb)), 1);
    }

    #[tokio::test]
    async fn test_second_visit_is_a_no_op() {
        let dht = Arc::new(MockDht::new());
        dht.add_peer(peer(0xa), vec![]);
        let (mut traversal, mut work_rx, _trigger) = traversal(&dht, 16);

        traversal.visit(peer(0xa)).await;
        let lookups = dht.peer_lookups();
        assert_eq!(lookups, 2);
        assert_eq!(drain(&mut work_rx).len(), 1);

        let outcome = traversal.visit(peer(0xa)).await;
        assert_eq!(
            outcome,
            TraversalOutcome::Completed(TraversalSummary::default())
        );
        assert_eq!(dht.peer_lookups(), lookups);
        assert!(drain(&mut work_rx).is_empty());
    }

    #[tokio::test]
    async fn test_walk_is_depth_first_in_listed_order() {
        // a -> [b, c], b -> [d], c -> [e], closest [a, f]
        let dht = Arc::new(MockDht::new());
        dht.set_closest(vec![peer(0xa), peer(0xf)]);
        dht.add_peer(peer(0xa), vec![peer(0xb), peer(0xc)]);
        dht.add_peer(peer(0xb), vec![peer(0xd)]);
        dht.add_peer(peer(0xc), vec![peer(0xe)]);
        dht.add_peer(peer(0xd), vec![]);
        dht.add_peer(peer(0xe), vec![]);
        dht.add_peer(peer(0xf), vec![]);
        let (mut traversal, mut work_rx, _trigger) = traversal(&dht, 16);

        traversal.explore(&anchor()).await.unwrap();

        let order: Vec<PeerId> = drain(&mut work_rx).into_iter().map(|i| i.id).collect();
        assert_eq!(
            order,
            vec![peer(0xa), peer(0xb), peer(0xd), peer(0xc), peer(0xe), peer(0xf)]
        );
    }

    #[tokio::test]
    async fn test_cycles_are_resolved_once() {
        let dht = Arc::new(MockDht::new());
        dht.set_closest(vec![peer(1), peer(2)]);
        dht.add_peer(peer(1), vec![peer(2), peer(3)]);
        dht.add_peer(peer(2), vec![peer(1), peer(3)]);
        dht.add_peer(peer(3), vec![peer(1), peer(2)]);
        let (mut traversal, mut work_rx, _trigger) = traversal(&dht, 16);

        traversal.explore(&anchor()).await.unwrap();
        // A later round entering the same component does no peer lookups.
        traversal.explore(&anchor()).await.unwrap();

        assert_eq!(drain(&mut work_rx).len(), 3);
        for byte in 1..=3 {
            assert_eq!(dht.resolve_calls(&peer(byte)), 1);
            assert_eq!(dht.connected_calls(&peer(byte)), 1);
        }
        assert_eq!(dht.closest_calls(), 2);
    }

    #[tokio::test]
    async fn test_expansion_failure_abandons_branch() {
        let dht = Arc::new(MockDht::new());
        dht.set_closest(vec![peer(1), peer(2)]);
        dht.add_unexpandable(peer(1));
        dht.add_peer(peer(2), vec![]);
        let (mut traversal, mut work_rx, _trigger) = traversal(&dht, 16);

        let outcome = traversal.explore(&anchor()).await.unwrap();

        assert!(matches!(outcome, TraversalOutcome::Completed(s) if s.queued == 2));
        assert_eq!(drain(&mut work_rx), vec![info(1), info(2)]);
    }

    #[tokio::test]
    async fn test_closest_lookup_error_is_returned() {
        let dht = Arc::new(MockDht::new());
        dht.push_closest_error(DhtError::Protocol("no route".to_string()));
        let (mut traversal, mut work_rx, _trigger) = traversal(&dht, 16);

        let result = traversal.explore(&anchor()).await;

        assert!(matches!(result, Err(DhtError::Protocol(_))));
        assert!(drain(&mut work_rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_closest_lookup_times_out() {
        let dht = Arc::new(MockDht::new());
        dht.stall();
        let (mut traversal, _work_rx, _trigger) = traversal(&dht, 16);
        let start = tokio::time::Instant::now();

        let result = traversal.explore(&anchor()).await;

        assert!(matches!(result, Err(DhtError::Timeout)));
        assert!(start.elapsed() >= LOOKUP_TIMEOUT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_timeout_abandons_branch() {
        let dht = Arc::new(MockDht::new());
        dht.set_closest(vec![peer(1), peer(2)]);
        dht.add_peer(peer(1), vec![peer(3)]);
        dht.add_peer(peer(2), vec![]);
        dht.add_peer(peer(3), vec![]);
        dht.stall_peer(peer(1));
        let (mut traversal, mut work_rx, _trigger) = traversal(&dht, 16);
        let start = tokio::time::Instant::now();

        let outcome = traversal.explore(&anchor()).await.unwrap();

        assert_eq!(
            outcome,
            TraversalOutcome::Completed(TraversalSummary {
                closest: 2,
                visited: 2,
                queued: 1,
                unresolved: 1,
            })
        );
        assert_eq!(drain(&mut work_rx), vec![info(2)]);
        assert_eq!(dht.resolve_calls(&peer(3)), 0);
        assert!(start.elapsed() >= LOOKUP_TIMEOUT);
        assert!(start.elapsed() < LOOKUP_TIMEOUT * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expansion_timeout_abandons_branch() {
        let dht = Arc::new(MockDht::new());
        dht.set_closest(vec![peer(1), peer(2)]);
        dht.add_peer(peer(1), vec![peer(3)]);
        dht.add_peer(peer(2), vec![]);
        dht.stall_expansion(peer(1));
        let (mut traversal, mut work_rx, _trigger) = traversal(&dht, 16);

        let outcome = traversal.explore(&anchor()).await.unwrap();

        assert!(matches!(outcome, TraversalOutcome::Completed(s) if s.queued == 2));
        assert_eq!(drain(&mut work_rx), vec![info(1), info(2)]);
        assert_eq!(dht.resolve_calls(&peer(3)), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_queue_blocks_until_shutdown() {
        let dht = Arc::new(MockDht::new());
        dht.set_closest(vec![peer(1), peer(2), peer(3)]);
        for byte in 1..=3 {
            dht.add_peer(peer(byte), vec![]);
        }
        let (mut traversal, mut work_rx, trigger) = traversal(&dht, 1);
        let key = anchor();

        let (outcome, _) = tokio::join!(traversal.explore(&key), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.trigger();
        });

        assert_eq!(outcome.unwrap(), TraversalOutcome::Cancelled);
        assert_eq!(drain(&mut work_rx), vec![info(1)]);
        // Peer 3 was never reached.
        assert_eq!(dht.resolve_calls(&peer(3)), 0);
    }

    #[tokio::test]
    async fn test_no_lookups_after_shutdown() {
        let dht = Arc::new(MockDht::new());
        dht.set_closest(vec![peer(1)]);
        dht.add_peer(peer(1), vec![]);
        let (mut traversal, _work_rx, trigger) = traversal(&dht, 16);
        trigger.trigger();

        let outcome = traversal.explore(&anchor()).await.unwrap();

        assert_eq!(outcome, TraversalOutcome::Cancelled);
        assert_eq!(dht.closest_calls(), 0);
        assert_eq!(dht.peer_lookups(), 0);
    }
}
