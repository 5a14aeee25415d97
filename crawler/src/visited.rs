//! Deduplication of processed peers.

use dht_peers_network::PeerId;
use std::collections::HashSet;

/// Peers a crawler has already processed, for its whole lifetime.
///
/// Entries are never removed. The set has no internal locking: it relies on a
/// single writer, which `&mut self` enforces for the traversal that owns it.
/// Sharing it between concurrent traversals requires wrapping it in a lock
/// or switching to a concurrent set.
#[derive(Debug, Default)]
pub struct VisitedSet {
    peers: HashSet<PeerId>,
}

impl VisitedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `id`, returning `true` only the first time it is seen.
    ///
    /// A `false` result means the peer needs no further work.
    pub fn mark_if_new(&mut self, id: &PeerId) -> bool {
        if self.peers.contains(id) {
            return false;
        }
        self.peers.insert(id.clone())
    }

    /// Number of distinct peers seen so far.
    pub fn len(&self) -> usize {
        self.peers.len()
    }
}
