//! Error types reported by the DHT and host collaborators.

use std::error::Error;
use std::fmt;
use std::io;

/// Errors that can occur during a DHT lookup.
#[derive(Debug)]
pub enum DhtError {
    /// The DHT has no routing knowledge of the requested peer.
    NotFound,
    /// The lookup did not finish within its time bound.
    Timeout,
    /// An I/O error occurred while querying remote peers.
    Io(io::Error),
    /// A remote peer answered with something the DHT could not use.
    Protocol(String),
}

impl fmt::Display for DhtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DhtError::NotFound => write!(f, "Peer not found in the DHT"),
            DhtError::Timeout => write!(f, "DHT lookup timed out"),
            DhtError::Io(err) => write!(f, "DHT lookup error: {err}"),
            DhtError::Protocol(msg) => write!(f, "DHT protocol error: {msg}"),
        }
    }
}

impl Error for DhtError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DhtError::Io(err) => Some(err),
            DhtError::NotFound => None,
            DhtError::Timeout => None,
            DhtError::Protocol(_) => None,
        }
    }
}

impl From<io::Error> for DhtError {
    fn from(err: io::Error) -> Self {
        DhtError::Io(err)
    }
}

/// Errors that can occur while dialing a peer.
#[derive(Debug)]
pub enum DialError {
    /// A recent dial to this peer already failed and a cool-down is in effect.
    ///
    /// This is the only kind worth retrying, once the cool-down has had time to expire.
    Backoff,
    /// The dial did not finish within its time bound.
    Timeout,
    /// The peer has no addresses to dial.
    NoAddresses,
    /// An I/O error occurred while dialing.
    Io(io::Error),
    /// The remote end or the local host refused the connection.
    Refused(String),
}

impl DialError {
    /// Returns `true` if this is the dial backoff kind.
    pub fn is_backoff(&self) -> bool {
        matches!(self, DialError::Backoff)
    }
}

impl fmt::Display for DialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DialError::Backoff => write!(f, "Dial backoff in effect for peer"),
            DialError::Timeout => write!(f, "Dial timed out"),
            DialError::NoAddresses => write!(f, "No addresses to dial"),
            DialError::Io(err) => write!(f, "Dial error: {err}"),
            DialError::Refused(reason) => write!(f, "Connection refused: {reason}"),
        }
    }
}

impl Error for DialError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DialError::Io(err) => Some(err),
            DialError::Backoff => None,
            DialError::Timeout => None,
            DialError::NoAddresses => None,
            DialError::Refused(_) => None,
        }
    }
}

impl From<io::Error> for DialError {
    fn from(err: io::Error) -> Self {
        DialError::Io(err)
    }
}
