//! The network host the crawler dials through.

use crate::error::DialError;
use crate::peer::{PeerAddressInfo, PeerId};
use std::future::Future;

/// Connection management of an existing network host.
pub trait Host: Send + Sync + 'static {
    /// Connect to a peer.
    ///
    /// Connecting to an already connected peer succeeds without opening a
    /// second connection. A recent failed dial to the same peer surfaces as
    /// [`DialError::Backoff`].
    fn connect(
        &self,
        info: &PeerAddressInfo,
    ) -> impl Future<Output = Result<(), DialError>> + Send;

    /// Number of live connections currently open to `id`.
    fn live_connections_to(&self, id: &PeerId) -> usize;
}
