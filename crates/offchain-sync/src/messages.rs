//! Wire messages of the command exchange

use crate::envelope::SignedEnvelope;
use crate::error::TransportError;
use offchain_core::{ChannelId, CommandId, RejectReason, VaspId};
use offchain_sequencer::Verdict;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

/// Batch of sequenced commands pushed to the counterparty
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRequest {
    pub request_id: Uuid,
    pub channel_id: ChannelId,
    pub sender: VaspId,
    pub receiver: VaspId,
    /// Next offset the sender will assign in its own sequence
    pub sender_next_offset: u64,
    /// Next offset the sender expects from the receiver's sequence
    pub sender_expects: u64,
    /// Consecutive envelopes starting at the sender's peer cursor
    pub envelopes: Vec<SignedEnvelope>,
}

/// How the receiver handled one envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandVerdict {
    Accepted,
    Rejected { reason: RejectReason },
    /// Raced a receiver pending command; `winner` authored the applied one
    Conflict { winner: VaspId },
    /// Already committed; `accepted` tells whether it was applied
    Duplicate {
        accepted: bool,
        reason: Option<RejectReason>,
    },
    OutOfOrder { next_expected: u64 },
    /// Signature or content check failed; nothing after it was processed
    Unverified,
}

impl CommandVerdict {
    /// Settlement of the sender's command, if this verdict settles it
    pub fn settlement(&self, sender: VaspId) -> Option<Verdict> {
        match self {
            CommandVerdict::Accepted => Some(Verdict::Accepted),
            CommandVerdict::Rejected { reason } => Some(Verdict::Rejected {
                reason: reason.clone(),
            }),
            CommandVerdict::Conflict { winner } if *winner == sender => Some(Verdict::Accepted),
            CommandVerdict::Conflict { .. } => Some(Verdict::Rejected {
                reason: RejectReason::LostConflict,
            }),
            CommandVerdict::Duplicate { accepted: true, .. } => Some(Verdict::Accepted),
            CommandVerdict::Duplicate {
                accepted: false,
                reason,
            } => Some(Verdict::Rejected {
                reason: reason.clone().unwrap_or(RejectReason::LostConflict),
            }),
            CommandVerdict::OutOfOrder { .. } | CommandVerdict::Unverified => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub offset: u64,
    /// `None` when the envelope could not be opened
    pub command_id: Option<CommandId>,
    pub verdict: CommandVerdict,
}

/// Answer to a [`CommandRequest`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub request_id: Uuid,
    pub results: Vec<CommandResult>,
    /// Next offset the receiver expects from the sender's sequence
    pub next_expected: u64,
    /// Next offset the receiver will assign in its own sequence
    pub receiver_next_offset: u64,
}

/// Binary wire encoding
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, TransportError> {
    bincode::serialize(message).map_err(|e| TransportError::Encoding(e.to_string()))
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, TransportError> {
    bincode::deserialize(bytes).map_err(|e| TransportError::Encoding(e.to_string()))
}
