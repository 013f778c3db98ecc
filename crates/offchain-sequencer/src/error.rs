//! Sequencer errors
//!
//! Only protocol violations and storage failures are errors. Rejections,
//! conflicts, duplicates and gaps are ordinary outcomes.

use offchain_core::{CommandId, VaspId};
use offchain_journal::{JournalError, ReplayError, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SequencerError {
    #[error("command authored by {actual}, expected {expected}")]
    WrongAuthor { expected: VaspId, actual: VaspId },

    #[error("command id {command_id} does not match its content")]
    IdMismatch { command_id: CommandId },

    #[error("remote offset {offset} already holds {committed}, received {received}")]
    OffsetCollision {
        offset: u64,
        committed: CommandId,
        received: CommandId,
    },

    #[error("no local command at offset {offset}")]
    UnknownOffset { offset: u64 },

    #[error("sequencer is poisoned by an earlier storage failure; reopen it")]
    Poisoned,

    #[error("storage failure: {0}")]
    Store(#[from] StoreError),

    #[error("recovery failed: {0}")]
    Replay(#[from] ReplayError),

    #[error("channel state: {0}")]
    Journal(#[from] JournalError),
}

impl SequencerError {
    /// Whether the counterparty sent something that breaks the protocol
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            SequencerError::WrongAuthor { .. }
                | SequencerError::IdMismatch { .. }
                | SequencerError::OffsetCollision { .. }
        )
    }
}
