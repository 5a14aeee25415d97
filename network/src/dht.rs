//! The DHT lookup service the crawler drives.

use crate::error::DhtError;
use crate::peer::{PeerAddressInfo, PeerId};
use std::future::Future;

/// Lookup operations of an existing DHT node.
///
/// Each lookup yields a finite result set which the implementation collects
/// before returning. Callers bound every call with their own timeout and may
/// drop the future at any point, so implementations must be cancel safe.
pub trait Dht: Send + Sync + 'static {
    /// Find the peers closest to `key` in the DHT keyspace.
    fn closest_peers(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Vec<PeerId>, DhtError>> + Send;

    /// Resolve the addresses of a single peer.
    fn resolve_peer(
        &self,
        id: &PeerId,
    ) -> impl Future<Output = Result<PeerAddressInfo, DhtError>> + Send;

    /// List the peers that `id` reports being connected to.
    fn peers_connected_to(
        &self,
        id: &PeerId,
    ) -> impl Future<Output = Result<Vec<PeerAddressInfo>, DhtError>> + Send;
}
