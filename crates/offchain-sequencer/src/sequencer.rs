//! Per-channel sequencer
//!
//! Owns the [`ChannelState`] of one counterparty relationship. Every
//! operation is a synchronous unit of work: mutate in memory, persist the
//! matching [`JournalRecord`], return. Callers serialize access per channel
//! (see [`crate::ChannelRegistry`]); nothing here blocks on the network.

use crate::error::SequencerError;
use crate::outcome::{ProposeOutcome, ReceiveOutcome, Verdict, VerdictOutcome};
use crate::recovery::{self, RecoveryReport};
use offchain_core::{
    apply, now_millis, ChannelId, Command, ObjectId, ObjectState, OffChainObject, Party,
    RejectReason, TieBreak, Validator, VaspId,
};
use offchain_journal::{
    ChannelState, CommandStore, Disposition, JournalError, JournalRecord, ObjectSnapshot,
    RemoteClass, RemoteVerdict, SequenceEntry,
};
use std::sync::Arc;

/// Command sequencer and conflict resolver for one channel
pub struct Sequencer {
    state: ChannelState,
    store: Arc<dyn CommandStore>,
    validator: Arc<dyn Validator>,
    tie_break: TieBreak,
    /// First local offset the counterparty has not confirmed receiving
    peer_cursor: u64,
    poisoned: bool,
}

impl std::fmt::Debug for Sequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sequencer")
            .field("channel", &self.state.channel_id())
            .field("local_next", &self.state.next_expected_offset(Party::Local))
            .field("remote_next", &self.state.next_expected_offset(Party::Remote))
            .field("peer_cursor", &self.peer_cursor)
            .field("poisoned", &self.poisoned)
            .finish()
    }
}

impl Sequencer {
    /// Open the channel between `local` and `remote`, replaying whatever the
    /// store holds for it
    pub fn open(
        local: VaspId,
        remote: VaspId,
        store: Arc<dyn CommandStore>,
        validator: Arc<dyn Validator>,
        tie_break: TieBreak,
    ) -> Result<Self, SequencerError> {
        let (state, report) = recovery::rebuild(local, remote, store.as_ref())?;
        let peer_cursor = report.peer_cursor;
        log_recovery(&state, &report);
        Ok(Self {
            state,
            store,
            validator,
            tie_break,
            peer_cursor,
            poisoned: false,
        })
    }

    pub fn channel_id(&self) -> ChannelId {
        self.state.channel_id()
    }

    pub fn local_id(&self) -> VaspId {
        self.state.local_id()
    }

    pub fn remote_id(&self) -> VaspId {
        self.state.remote_id()
    }

    pub fn tie_break(&self) -> TieBreak {
        self.tie_break
    }

    pub fn state(&self) -> &ChannelState {
        &self.state
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    pub fn next_expected_offset(&self, party: Party) -> u64 {
        self.state.next_expected_offset(party)
    }

    /// Current version of an object, including local pending updates
    pub fn object(&self, object_id: &ObjectId) -> Option<&OffChainObject> {
        self.state.object(object_id)
    }

    /// Build a local command against the current head of `object_id`
    pub fn draft(&self, object_id: ObjectId, state: ObjectState) -> Command {
        // Timestamps strictly increase so identical intents never share an id
        let last = self
            .state
            .sequence(Party::Local)
            .iter()
            .last()
            .map_or(0, |entry| entry.command.timestamp);
        let timestamp = now_millis().max(last + 1);
        Command::new(
            self.state.local_id(),
            object_id.clone(),
            self.state.object(&object_id),
            state,
            timestamp,
        )
    }

    /// Sequence a locally authored command.
    ///
    /// Validation failures are returned as [`ProposeOutcome::Rejected`] and
    /// consume no offset.
    pub fn propose(&mut self, command: Command) -> Result<ProposeOutcome, SequencerError> {
        self.ensure_healthy()?;
        self.check_author(&command, Party::Local)?;

        let prior = self.state.object(&command.object_id);
        let object = match apply(prior, &command, self.validator.as_ref()) {
            Ok(object) => object,
            Err(err) => {
                tracing::warn!(
                    channel = %self.channel_id(),
                    command_id = %command.command_id,
                    reason = %err.reason(),
                    "local command rejected"
                );
                return Ok(ProposeOutcome::Rejected {
                    command_id: command.command_id,
                    reason: err.reason(),
                });
            }
        };

        let object_id = command.object_id.clone();
        let offset = self
            .state
            .commit_object(Party::Local, command.clone(), object);
        self.persist(
            JournalRecord::LocalCommitted {
                offset,
                command: command.clone(),
            },
            &object_id,
        )?;

        tracing::debug!(
            channel = %self.channel_id(),
            offset,
            command_id = %command.command_id,
            object = %object_id,
            "local command sequenced"
        );
        Ok(ProposeOutcome::Accepted { offset })
    }

    /// Sequence a remote command delivered for remote offset `offset`
    pub fn receive(
        &mut self,
        command: Command,
        offset: u64,
    ) -> Result<ReceiveOutcome, SequencerError> {
        self.ensure_healthy()?;
        self.check_author(&command, Party::Remote)?;

        let next_expected = self.state.next_expected_offset(Party::Remote);
        if offset < next_expected {
            return self.duplicate(&command, offset);
        }
        if offset > next_expected {
            tracing::debug!(
                channel = %self.channel_id(),
                offset,
                next_expected,
                "remote command beyond sequence end"
            );
            return Ok(ReceiveOutcome::OutOfOrder { next_expected });
        }

        let object_id = command.object_id.clone();
        let outcome = match self.state.classify_remote(&command) {
            RemoteClass::Extends => {
                let prior = self.state.object(&object_id);
                match apply(prior, &command, self.validator.as_ref()) {
                    Ok(object) => {
                        self.state
                            .commit_object(Party::Remote, command.clone(), object);
                        self.persist(
                            JournalRecord::RemoteCommitted {
                                offset,
                                command: command.clone(),
                                verdict: RemoteVerdict::Applied { displaced: None },
                            },
                            &object_id,
                        )?;
                        ReceiveOutcome::Accepted { offset }
                    }
                    Err(err) => self.reject_remote(command.clone(), offset, err.reason())?,
                }
            }
            RemoteClass::Races { local_offset } => {
                self.resolve_race(command.clone(), offset, local_offset)?
            }
            RemoteClass::Stale(reason) => self.reject_remote(command.clone(), offset, reason)?,
        };

        tracing::debug!(
            channel = %self.channel_id(),
            offset,
            command_id = %command.command_id,
            object = %object_id,
            outcome = ?outcome,
            "remote command sequenced"
        );
        Ok(outcome)
    }

    fn duplicate(&self, command: &Command, offset: u64) -> Result<ReceiveOutcome, SequencerError> {
        let entry = self
            .state
            .sequence(Party::Remote)
            .get(offset)
            .ok_or(SequencerError::UnknownOffset { offset })?;
        if entry.command.command_id != command.command_id {
            tracing::error!(
                channel = %self.channel_id(),
                offset,
                committed = %entry.command.command_id,
                received = %command.command_id,
                "counterparty reused a committed offset"
            );
            return Err(SequencerError::OffsetCollision {
                offset,
                committed: entry.command.command_id,
                received: command.command_id,
            });
        }
        Ok(ReceiveOutcome::DuplicateIgnored {
            offset,
            disposition: entry.disposition.clone(),
        })
    }

    fn resolve_race(
        &mut self,
        command: Command,
        offset: u64,
        local_offset: u64,
    ) -> Result<ReceiveOutcome, SequencerError> {
        let local = self
            .state
            .sequence(Party::Local)
            .get(local_offset)
            .map(|entry| entry.command.clone())
            .ok_or(JournalError::UnknownOffset {
                party: Party::Local,
                offset: local_offset,
            })?;

        // The remote command is checked against the version it actually extends
        let prior = self
            .state
            .chain(&command.object_id)
            .and_then(|chain| chain.at_version(command.expected_version))
            .map(|link| link.object.clone());
        let object = match apply(prior.as_ref(), &command, self.validator.as_ref()) {
            Ok(object) => object,
            Err(err) => return self.reject_remote(command, offset, err.reason()),
        };

        let remote_wins = self.tie_break.resolve(&local, &command).command_id == command.command_id;
        if !remote_wins {
            tracing::warn!(
                channel = %self.channel_id(),
                offset,
                command_id = %command.command_id,
                local_offset,
                "remote command lost conflict"
            );
            self.state
                .commit_rejected(command.clone(), RejectReason::LostConflict);
            self.persist(
                JournalRecord::RemoteCommitted {
                    offset,
                    command,
                    verdict: RemoteVerdict::Rejected {
                        reason: RejectReason::LostConflict,
                    },
                },
                &local.object_id,
            )?;
            return Ok(ReceiveOutcome::Conflict {
                offset,
                winner: Party::Local,
                retracted: Vec::new(),
            });
        }

        let retracted = self
            .state
            .retract(local_offset, RejectReason::LostConflict)?;
        let object_id = command.object_id.clone();
        self.state
            .commit_object(Party::Remote, command.clone(), object);
        self.persist(
            JournalRecord::RemoteCommitted {
                offset,
                command,
                verdict: RemoteVerdict::Applied {
                    displaced: Some(local_offset),
                },
            },
            &object_id,
        )?;
        tracing::warn!(
            channel = %self.channel_id(),
            offset,
            local_offset,
            ?retracted,
            "local command lost conflict, rolled back"
        );
        Ok(ReceiveOutcome::Conflict {
            offset,
            winner: Party::Remote,
            retracted,
        })
    }

    fn reject_remote(
        &mut self,
        command: Command,
        offset: u64,
        reason: RejectReason,
    ) -> Result<ReceiveOutcome, SequencerError> {
        tracing::warn!(
            channel = %self.channel_id(),
            offset,
            command_id = %command.command_id,
            %reason,
            "remote command rejected"
        );
        let object_id = command.object_id.clone();
        self.state.commit_rejected(command.clone(), reason.clone());
        self.persist(
            JournalRecord::RemoteCommitted {
                offset,
                command,
                verdict: RemoteVerdict::Rejected {
                    reason: reason.clone(),
                },
            },
            &object_id,
        )?;
        Ok(ReceiveOutcome::Rejected { offset, reason })
    }

    /// Settle a local command with the counterparty's verdict.
    ///
    /// Repeated verdicts are no-ops; contradicting ones are logged and dropped.
    pub fn apply_verdict(
        &mut self,
        local_offset: u64,
        verdict: Verdict,
    ) -> Result<VerdictOutcome, SequencerError> {
        self.ensure_healthy()?;
        let entry = self
            .state
            .sequence(Party::Local)
            .get(local_offset)
            .ok_or(SequencerError::UnknownOffset {
                offset: local_offset,
            })?;
        let object_id = entry.command.object_id.clone();
        let command_id = entry.command.command_id;
        let disposition = entry.disposition.clone();

        match (disposition, verdict) {
            (Disposition::Pending, Verdict::Accepted) => {
                self.state.acknowledge(local_offset)?;
                self.persist(
                    JournalRecord::Acknowledged {
                        offset: local_offset,
                    },
                    &object_id,
                )?;
                tracing::debug!(
                    channel = %self.channel_id(),
                    offset = local_offset,
                    %command_id,
                    "local command applied by peer"
                );
                Ok(VerdictOutcome::Acknowledged)
            }
            (Disposition::Pending, Verdict::Rejected { reason }) => {
                let offsets = match self.state.retract(local_offset, reason.clone()) {
                    Ok(offsets) => offsets,
                    Err(err @ JournalError::RetractBlocked { .. }) => {
                        tracing::warn!(
                            channel = %self.channel_id(),
                            offset = local_offset,
                            error = %err,
                            "rejection contradicts applied history, ignored"
                        );
                        return Ok(VerdictOutcome::Ignored);
                    }
                    Err(err) => return Err(err.into()),
                };
                self.persist(
                    JournalRecord::Retracted {
                        offset: local_offset,
                        reason: reason.clone(),
                    },
                    &object_id,
                )?;
                tracing::warn!(
                    channel = %self.channel_id(),
                    offset = local_offset,
                    %command_id,
                    %reason,
                    retracted = ?offsets,
                    "local command rejected by peer"
                );
                Ok(VerdictOutcome::Retracted { offsets })
            }
            (Disposition::Applied, Verdict::Accepted)
            | (Disposition::Rejected { .. }, Verdict::Rejected { .. }) => {
                Ok(VerdictOutcome::AlreadySettled)
            }
            (current, verdict) => {
                tracing::warn!(
                    channel = %self.channel_id(),
                    offset = local_offset,
                    %command_id,
                    current = ?current,
                    verdict = ?verdict,
                    "contradicting verdict ignored"
                );
                Ok(VerdictOutcome::Ignored)
            }
        }
    }

    /// First local offset not yet known to be held by the counterparty
    pub fn peer_cursor(&self) -> u64 {
        self.peer_cursor
    }

    /// Move the peer cursor to the counterparty's reported `next_expected`
    pub fn set_peer_cursor(&mut self, next_expected: u64) {
        let clamped = next_expected.min(self.state.next_expected_offset(Party::Local));
        if clamped != self.peer_cursor {
            tracing::debug!(
                channel = %self.channel_id(),
                from = self.peer_cursor,
                to = clamped,
                "peer cursor moved"
            );
        }
        self.peer_cursor = clamped;
    }

    /// Local entries to send next, starting at the peer cursor
    pub fn outbound(&self, max: usize) -> Vec<SequenceEntry> {
        self.state
            .sequence(Party::Local)
            .from_offset(self.peer_cursor)
            .iter()
            .take(max)
            .cloned()
            .collect()
    }

    /// Local commands still waiting for a verdict
    pub fn pending_local(&self) -> usize {
        self.state.sequence(Party::Local).pending_count()
    }

    /// No pending local command and the peer holds every local offset
    pub fn is_settled(&self) -> bool {
        self.pending_local() == 0
            && self.peer_cursor == self.state.next_expected_offset(Party::Local)
    }

    fn check_author(&self, command: &Command, side: Party) -> Result<(), SequencerError> {
        let expected = self.state.party_id(side);
        if command.author != expected {
            return Err(SequencerError::WrongAuthor {
                expected,
                actual: command.author,
            });
        }
        if !command.verify_id() {
            return Err(SequencerError::IdMismatch {
                command_id: command.command_id,
            });
        }
        Ok(())
    }

    fn ensure_healthy(&self) -> Result<(), SequencerError> {
        if self.poisoned {
            return Err(SequencerError::Poisoned);
        }
        Ok(())
    }

    fn persist(&mut self, record: JournalRecord, object_id: &ObjectId) -> Result<(), SequencerError> {
        let snapshot = ObjectSnapshot {
            object_id: object_id.clone(),
            object: self.state.object(object_id).cloned(),
        };
        let channel = self.state.channel_id();
        if let Err(err) = self.store.append(&channel, &record, &[snapshot]) {
            self.poisoned = true;
            tracing::error!(
                channel = %channel,
                offset = record.offset(),
                error = %err,
                "journal append failed, sequencer poisoned"
            );
            return Err(err.into());
        }
        Ok(())
    }
}

fn log_recovery(state: &ChannelState, report: &RecoveryReport) {
    tracing::info!(
        channel = %state.channel_id(),
        peer = %state.remote_id(),
        records = report.records,
        local_next = state.next_expected_offset(Party::Local),
        remote_next = state.next_expected_offset(Party::Remote),
        pending = report.pending,
        "channel opened"
    );
}
