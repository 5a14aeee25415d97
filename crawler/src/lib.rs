//! Active peer discovery for DHT-based overlays.
//!
//! The [`Crawler`] walks the peers a DHT knows about, starting from random
//! points in its keyspace, and connects to each peer it finds. Successful
//! connections are streamed to the caller through a [`CrawlHandle`].

mod anchor;
mod builder;
mod crawler;
mod dialer;
mod pool;
mod session;
mod shutdown;
mod stats;
#[cfg(test)]
mod test_utils;
mod traversal;
mod visited;

pub use anchor::AnchorKey;
pub use builder::{CrawlerBuilder, CrawlerBuilderError};
pub use crawler::{CrawlError, CrawlHandle, Crawler};
pub use session::LookupFailurePolicy;
pub use stats::StatsSnapshot;

// Re-exports.
pub use dht_peers_network::{Dht, DhtError, DialError, Host, PeerAddressInfo, PeerId};
