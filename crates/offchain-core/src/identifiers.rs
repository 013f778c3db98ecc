//! Identifiers for VASPs, channels, objects and commands

use crate::hash::{ContentHasher, Hash32};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identity of a Virtual Asset Service Provider
///
/// One of the two counterparties of a channel. Ordering over `VaspId` is the
/// basis of the role assignment used for conflict tie-breaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VaspId(pub Uuid);

impl VaspId {
    /// Create a VASP id from caller-provided entropy.
    pub fn new_from_entropy(entropy: [u8; 32]) -> Self {
        let mut uuid_bytes = [0u8; 16];
        uuid_bytes.copy_from_slice(&entropy[..16]);
        Self(Uuid::from_bytes(uuid_bytes))
    }

    /// Create a random VASP id
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from a UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    pub fn uuid(&self) -> Uuid {
        self.0
    }

    /// Convert to bytes
    pub fn to_bytes(&self) -> [u8; 16] {
        self.0.into_bytes()
    }

    /// Lowest bit of the id, used by parity-balanced role assignment
    pub fn last_bit(&self) -> u8 {
        self.to_bytes()[15] & 1
    }
}

impl fmt::Display for VaspId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vasp-{}", self.0)
    }
}

impl FromStr for VaspId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid_str = s.strip_prefix("vasp-").unwrap_or(s);
        Ok(VaspId(Uuid::parse_str(uuid_str)?))
    }
}

impl From<Uuid> for VaspId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Channel identifier
///
/// Derived from the two counterparties so that both sides compute the same id
/// without coordination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelId(pub Hash32);

impl ChannelId {
    /// Channel id for the pair `{a, b}`; argument order does not matter
    pub fn between(a: VaspId, b: VaspId) -> Self {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        let mut hasher = ContentHasher::new("offchain/channel");
        hasher.field(&low.to_bytes()).field(&high.to_bytes());
        Self(hasher.finalize())
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }

    /// Full hex form, used for file names
    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel:{}", &self.0.to_hex()[..16])
    }
}

impl FromStr for ChannelId {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex_str = s.strip_prefix("channel:").unwrap_or(s);
        Ok(ChannelId(Hash32::from_hex(hex_str)?))
    }
}

/// Identifier of a shared off-chain object (a payment reference id)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(pub String);

impl ObjectId {
    /// Create an object id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Content-derived command identifier, also the idempotency key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CommandId(pub Hash32);

impl CommandId {
    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cmd:{}", &self.0.to_hex()[..16])
    }
}

/// Owner of a sequence, relative to the local VASP
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Party {
    /// Commands authored by this VASP
    Local,
    /// Commands authored by the counterparty
    Remote,
}

impl Party {
    /// The other party
    pub fn opposite(self) -> Self {
        match self {
            Party::Local => Party::Remote,
            Party::Remote => Party::Local,
        }
    }
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Party::Local => write!(f, "local"),
            Party::Remote => write!(f, "remote"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_id_is_order_insensitive() {
        let a = VaspId::new_from_entropy([1u8; 32]);
        let b = VaspId::new_from_entropy([2u8; 32]);
        assert_eq!(ChannelId::between(a, b), ChannelId::between(b, a));
        assert_ne!(ChannelId::between(a, b), ChannelId::between(a, a));
    }

    #[test]
    fn vasp_id_parses_with_and_without_prefix() {
        let id = VaspId::new_from_entropy([7u8; 32]);
        assert_eq!(id.to_string().parse::<VaspId>().unwrap(), id);
        assert_eq!(id.uuid().to_string().parse::<VaspId>().unwrap(), id);
    }

    #[test]
    fn channel_id_parses_full_hex() {
        let a = VaspId::new_from_entropy([1u8; 32]);
        let b = VaspId::new_from_entropy([2u8; 32]);
        let channel = ChannelId::between(a, b);
        assert_eq!(channel.to_hex().parse::<ChannelId>().unwrap(), channel);
    }
}
