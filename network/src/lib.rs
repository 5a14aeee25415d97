mod dht;
mod error;
mod host;
mod peer;

pub use dht::Dht;
pub use error::{DhtError, DialError};
pub use host::Host;
pub use peer::{PeerAddressInfo, PeerId};
