//! Random lookup keys used to sample the DHT keyspace.

use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;

/// Number of random bytes in an anchor key.
pub const ANCHOR_KEY_LEN: usize = 32;

/// A random key whose only purpose is to seed a closest peers lookup.
///
/// Each crawl round starts from a fresh anchor so that successive rounds
/// enter the overlay at unrelated regions of the keyspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorKey {
    encoded: String,
}

impl AnchorKey {
    /// Generate an anchor from the operating system's secure random source.
    pub fn generate() -> Result<Self, rand::Error> {
        Self::generate_with(&mut OsRng)
    }

    /// Generate an anchor from the given random source.
    pub fn generate_with<R: RngCore + ?Sized>(rng: &mut R) -> Result<Self, rand::Error> {
        let mut bytes = [0u8; ANCHOR_KEY_LEN];
        rng.try_fill_bytes(&mut bytes)?;
        Ok(AnchorKey {
            encoded: hex::encode(bytes),
        })
    }

    /// The textual form handed to the DHT as the lookup key.
    pub fn as_str(&self) -> &str {
        &self.encoded
    }
}

impl fmt::Display for AnchorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoded)
    }
}
