//! Journal records
//!
//! Every mutation of a [`ChannelState`] is described by exactly one record.
//! Records are persisted before the mutation becomes visible to the
//! counterparty, so replaying the journal in order rebuilds the state that
//! was acknowledged. Replay runs the pure transition only; domain validation
//! happened when the command was first accepted.

use crate::channel::ChannelState;
use crate::error::{JournalError, ReplayError};
use offchain_core::{Command, Party, RejectReason, VaspId};
use serde::{Deserialize, Serialize};

/// Outcome recorded for a received remote command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteVerdict {
    /// Applied; `displaced` names the local offset that lost a race to it
    Applied { displaced: Option<u64> },
    Rejected { reason: RejectReason },
}

/// One durable channel mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalRecord {
    /// A local command was sequenced and applied as pending
    LocalCommitted { offset: u64, command: Command },
    /// A remote command was sequenced
    RemoteCommitted {
        offset: u64,
        command: Command,
        verdict: RemoteVerdict,
    },
    /// The counterparty applied a local command
    Acknowledged { offset: u64 },
    /// A local pending command was rolled back
    Retracted { offset: u64, reason: RejectReason },
}

impl JournalRecord {
    /// Sequence the record refers to
    pub fn party(&self) -> Party {
        match self {
            JournalRecord::RemoteCommitted { .. } => Party::Remote,
            _ => Party::Local,
        }
    }

    pub fn offset(&self) -> u64 {
        match self {
            JournalRecord::LocalCommitted { offset, .. }
            | JournalRecord::RemoteCommitted { offset, .. }
            | JournalRecord::Acknowledged { offset }
            | JournalRecord::Retracted { offset, .. } => *offset,
        }
    }

    /// Command introduced by this record, if any
    pub fn command(&self) -> Option<&Command> {
        match self {
            JournalRecord::LocalCommitted { command, .. }
            | JournalRecord::RemoteCommitted { command, .. } => Some(command),
            _ => None,
        }
    }
}

impl ChannelState {
    /// Rebuild a channel from its journal
    pub fn replay<I>(local_id: VaspId, remote_id: VaspId, records: I) -> Result<Self, ReplayError>
    where
        I: IntoIterator<Item = JournalRecord>,
    {
        let mut state = Self::new(local_id, remote_id);
        for (index, record) in records.into_iter().enumerate() {
            state
                .apply_record(record)
                .map_err(|source| ReplayError { index, source })?;
        }
        Ok(state)
    }

    /// Apply one record in journal order
    pub fn apply_record(&mut self, record: JournalRecord) -> Result<(), JournalError> {
        match record {
            JournalRecord::LocalCommitted { offset, command } => {
                self.check_next(Party::Local, offset)?;
                self.commit(Party::Local, command)?;
            }
            JournalRecord::RemoteCommitted {
                offset,
                command,
                verdict,
            } => {
                self.check_next(Party::Remote, offset)?;
                match verdict {
                    RemoteVerdict::Applied { displaced } => {
                        if let Some(local_offset) = displaced {
                            self.retract(local_offset, RejectReason::LostConflict)?;
                        }
                        self.commit(Party::Remote, command)?;
                    }
                    RemoteVerdict::Rejected { reason } => {
                        self.commit_rejected(command, reason);
                    }
                }
            }
            JournalRecord::Acknowledged { offset } => {
                self.acknowledge(offset)?;
            }
            JournalRecord::Retracted { offset, reason } => {
                self.retract(offset, reason)?;
            }
        }
        Ok(())
    }

    fn check_next(&self, party: Party, found: u64) -> Result<(), JournalError> {
        let expected = self.next_expected_offset(party);
        if found != expected {
            return Err(JournalError::OffsetGap {
                party,
                expected,
                found,
            });
        }
        Ok(())
    }
}
