//! Overlay peer identities and their reachable addresses.

use std::fmt;
use std::net::SocketAddr;

/// Opaque identifier of an overlay participant.
///
/// The crawler never interprets the bytes, it only compares and hashes them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(Vec<u8>);

impl PeerId {
    /// Create a peer identity from its raw bytes.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        PeerId(bytes.into())
    }

    /// Raw bytes of the identity.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

impl From<Vec<u8>> for PeerId {
    fn from(bytes: Vec<u8>) -> Self {
        PeerId(bytes)
    }
}

/// A peer identity plus the addresses it may be reachable at.
///
/// Produced by DHT peer resolution and consumed by the host when dialing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerAddressInfo {
    /// The peer's identity.
    pub id: PeerId,
    /// Zero or more addresses the peer may be listening on.
    pub addresses: Vec<SocketAddr>,
}

impl PeerAddressInfo {
    /// Create address info with no known addresses.
    pub fn new(id: PeerId) -> Self {
        PeerAddressInfo {
            id,
            addresses: Vec::new(),
        }
    }

    /// Returns a new `PeerAddressInfo` with the given addresses.
    pub fn with_addresses(&self, addresses: Vec<SocketAddr>) -> Self {
        PeerAddressInfo {
            id: self.id.clone(),
            addresses,
        }
    }

    /// Checks if the peer has at least one address to dial.
    pub fn is_dialable(&self) -> bool {
        !self.addresses.is_empty()
    }
}

impl fmt::Display for PeerAddressInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ([peer] addresses: ", self.id)?;
        if self.addresses.is_empty() {
            write!(f, "none")?;
        } else {
            for (i, addr) in self.addresses.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{addr}")?;
            }
        }
        write!(f, ")")
    }
}
