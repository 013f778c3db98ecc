//! Content hashing
//!
//! Command identifiers and channel identifiers are content addressed. Hashing is
//! pure and synchronous; the algorithm is selected here and nowhere else.
//!
//! Current algorithm: **SHA-256** (32-byte output).

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// 32-byte digest
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Hash32(pub [u8; 32]);

impl Hash32 {
    /// Wrap raw digest bytes
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Hash arbitrary bytes
    pub fn from_bytes(data: &[u8]) -> Self {
        hash(data)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex encoding of the full digest
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a 64 character hex string
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut array = [0u8; 32];
        array.copy_from_slice(&bytes);
        Ok(Self(array))
    }
}

impl fmt::Display for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form keeps log lines readable
        write!(f, "Hash32({})", &self.to_hex()[..12])
    }
}

/// Hash arbitrary bytes to a 32-byte digest
pub fn hash(data: &[u8]) -> Hash32 {
    let mut hasher = Sha256::new();
    hasher.update(data);
    Hash32(hasher.finalize().into())
}

/// Incremental hasher over length-prefixed fields.
///
/// Every field is prefixed with its length so that adjacent fields cannot be
/// shifted into each other (`"ab" + "c"` and `"a" + "bc"` hash differently).
pub struct ContentHasher {
    inner: Sha256,
}

impl ContentHasher {
    /// Start a hash under a domain separation tag
    pub fn new(domain: &str) -> Self {
        let mut hasher = Self {
            inner: Sha256::new(),
        };
        hasher.field(domain.as_bytes());
        hasher
    }

    /// Absorb one length-prefixed field
    pub fn field(&mut self, data: &[u8]) -> &mut Self {
        self.inner.update((data.len() as u64).to_le_bytes());
        self.inner.update(data);
        self
    }

    /// Absorb an integer field
    pub fn u64(&mut self, value: u64) -> &mut Self {
        self.field(&value.to_le_bytes())
    }

    /// Absorb an optional field; absence and presence are distinguished
    pub fn optional(&mut self, data: Option<&[u8]>) -> &mut Self {
        match data {
            Some(bytes) => {
                self.inner.update([1u8]);
                self.field(bytes)
            }
            None => {
                self.inner.update([0u8]);
                self
            }
        }
    }

    /// Finish and return the digest
    pub fn finalize(self) -> Hash32 {
        Hash32(self.inner.finalize().into())
    }
}
