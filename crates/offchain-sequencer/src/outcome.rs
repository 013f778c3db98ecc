//! Tagged outcomes of sequencer operations

use offchain_core::{CommandId, Party, RejectReason};
use offchain_journal::Disposition;
use serde::{Deserialize, Serialize};

/// Result of proposing a locally authored command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProposeOutcome {
    /// Committed at `offset` and pending the counterparty's verdict
    Accepted { offset: u64 },
    /// Not sequenced; no offset was consumed
    Rejected {
        command_id: CommandId,
        reason: RejectReason,
    },
}

impl ProposeOutcome {
    pub fn offset(&self) -> Option<u64> {
        match self {
            ProposeOutcome::Accepted { offset } => Some(*offset),
            ProposeOutcome::Rejected { .. } => None,
        }
    }
}

/// Result of receiving a remote command at a remote offset
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// Committed and applied
    Accepted { offset: u64 },
    /// Committed at `offset` without being applied
    Rejected { offset: u64, reason: RejectReason },
    /// Raced a local pending command; `winner` decided which one applies.
    /// `retracted` lists the local offsets rolled back when the remote won.
    Conflict {
        offset: u64,
        winner: Party,
        retracted: Vec<u64>,
    },
    /// Already committed at `offset`; nothing changed
    DuplicateIgnored {
        offset: u64,
        disposition: Disposition,
    },
    /// Gap: retransmit from `next_expected`
    OutOfOrder { next_expected: u64 },
}

impl ReceiveOutcome {
    /// Whether the remote command is applied locally
    pub fn is_applied(&self) -> bool {
        match self {
            ReceiveOutcome::Accepted { .. } => true,
            ReceiveOutcome::Conflict { winner, .. } => *winner == Party::Remote,
            ReceiveOutcome::DuplicateIgnored { disposition, .. } => disposition.is_applied(),
            ReceiveOutcome::Rejected { .. } | ReceiveOutcome::OutOfOrder { .. } => false,
        }
    }
}

/// Counterparty's answer about one local command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Accepted,
    Rejected { reason: RejectReason },
}

/// Effect of applying a verdict
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerdictOutcome {
    /// Pending command is now applied
    Acknowledged,
    /// Pending command and the listed later versions were rolled back
    Retracted { offsets: Vec<u64> },
    /// Same verdict as already recorded
    AlreadySettled,
    /// Verdict contradicts the recorded disposition and was dropped
    Ignored,
}
