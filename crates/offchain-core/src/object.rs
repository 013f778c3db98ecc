//! Shared off-chain objects
//!
//! An object is the compliance artifact both VASPs evolve together, e.g. the
//! KYC attachment of a payment. Objects are never mutated in place: each
//! accepted command produces a new version.

use crate::identifiers::{CommandId, ObjectId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of an off-chain object
///
/// The ladder follows the payment protocol: statuses only move upwards, except
/// for `Abort` which may be reached from any state below the finality barrier
/// (`ReadyForSettlement`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ObjectStatus {
    None,
    NeedsStableId,
    NeedsKycData,
    SoftMatch,
    NeedsRecipientSignature,
    ReadyForSettlement,
    Settled,
    Abort,
}

impl ObjectStatus {
    /// Position on the status ladder
    pub fn height(self) -> u8 {
        match self {
            ObjectStatus::None => 0,
            ObjectStatus::NeedsStableId => 1,
            ObjectStatus::NeedsKycData => 2,
            ObjectStatus::SoftMatch => 3,
            ObjectStatus::NeedsRecipientSignature => 4,
            ObjectStatus::ReadyForSettlement => 5,
            ObjectStatus::Settled => 6,
            ObjectStatus::Abort => 7,
        }
    }

    /// Terminal objects accept no further commands
    pub fn is_terminal(self) -> bool {
        matches!(self, ObjectStatus::Settled | ObjectStatus::Abort)
    }

    /// Whether the status is at or past the point where unilateral aborts stop
    pub fn past_finality_barrier(self) -> bool {
        self != ObjectStatus::Abort && self.height() >= ObjectStatus::ReadyForSettlement.height()
    }

    /// Stable snake_case name
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectStatus::None => "none",
            ObjectStatus::NeedsStableId => "needs_stable_id",
            ObjectStatus::NeedsKycData => "needs_kyc_data",
            ObjectStatus::SoftMatch => "soft_match",
            ObjectStatus::NeedsRecipientSignature => "needs_recipient_signature",
            ObjectStatus::ReadyForSettlement => "ready_for_settlement",
            ObjectStatus::Settled => "settled",
            ObjectStatus::Abort => "abort",
        }
    }
}

impl fmt::Display for ObjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name that is not a status
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown status {0:?}")]
pub struct UnknownStatus(pub String);

impl FromStr for ObjectStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        const ALL: [ObjectStatus; 8] = [
            ObjectStatus::None,
            ObjectStatus::NeedsStableId,
            ObjectStatus::NeedsKycData,
            ObjectStatus::SoftMatch,
            ObjectStatus::NeedsRecipientSignature,
            ObjectStatus::ReadyForSettlement,
            ObjectStatus::Settled,
            ObjectStatus::Abort,
        ];
        ALL.into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// Proposed content of an object version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectState {
    /// Lifecycle status
    pub status: ObjectStatus,
    /// Opaque domain fields; KYC data travels as a JSON blob under `kyc_data`
    pub fields: BTreeMap<String, String>,
}

impl ObjectState {
    /// State with a status and no fields
    pub fn new(status: ObjectStatus) -> Self {
        Self {
            status,
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field setter
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Builder-style status setter
    pub fn with_status(mut self, status: ObjectStatus) -> Self {
        self.status = status;
        self
    }

    /// Look up a field
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }
}

/// One materialized version of a shared object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffChainObject {
    pub object_id: ObjectId,
    /// Starts at 1 for the creating command; absent objects are version 0
    pub version: u64,
    pub state: ObjectState,
    /// Command that produced this version
    pub last_command: CommandId,
}

impl OffChainObject {
    /// Current status
    pub fn status(&self) -> ObjectStatus {
        self.state.status
    }

    /// Look up a field
    pub fn field(&self, key: &str) -> Option<&str> {
        self.state.field(key)
    }
}
