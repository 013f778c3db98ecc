//! Channel state: two sequences and the objects they produced
//!
//! Local commands are applied speculatively and stay [`Disposition::Pending`]
//! until the counterparty answers. A pending version can be rolled back, a
//! confirmed one never is. [`ChannelState::classify_remote`] decides how an
//! incoming remote command relates to the local view; the sequencer turns
//! that classification into a verdict.

use crate::chain::{Link, ObjectChain};
use crate::error::JournalError;
use crate::sequence::{Disposition, Sequence};
use offchain_core::{
    transition, ChannelId, Command, ObjectId, OffChainObject, Party, RejectReason, VaspId,
};
use std::collections::BTreeMap;

/// How a remote command relates to the current local view
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteClass {
    /// Builds on the current head of its object
    Extends,
    /// Builds on the version a local pending command also built on
    Races {
        /// Offset of the local command holding the contested version
        local_offset: u64,
    },
    /// Builds on a version that is no longer reachable
    Stale(RejectReason),
}

/// State of one bilateral channel as seen by the local party
#[derive(Debug, Clone)]
pub struct ChannelState {
    channel_id: ChannelId,
    local_id: VaspId,
    remote_id: VaspId,
    local: Sequence,
    remote: Sequence,
    objects: BTreeMap<ObjectId, ObjectChain>,
}

impl ChannelState {
    pub fn new(local_id: VaspId, remote_id: VaspId) -> Self {
        Self {
            channel_id: ChannelId::between(local_id, remote_id),
            local_id,
            remote_id,
            local: Sequence::new(Party::Local),
            remote: Sequence::new(Party::Remote),
            objects: BTreeMap::new(),
        }
    }

    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    pub fn local_id(&self) -> VaspId {
        self.local_id
    }

    pub fn remote_id(&self) -> VaspId {
        self.remote_id
    }

    /// Identity of the party on `side`
    pub fn party_id(&self, side: Party) -> VaspId {
        match side {
            Party::Local => self.local_id,
            Party::Remote => self.remote_id,
        }
    }

    pub fn sequence(&self, party: Party) -> &Sequence {
        match party {
            Party::Local => &self.local,
            Party::Remote => &self.remote,
        }
    }

    fn sequence_mut(&mut self, party: Party) -> &mut Sequence {
        match party {
            Party::Local => &mut self.local,
            Party::Remote => &mut self.remote,
        }
    }

    /// Next offset `party` will commit at
    pub fn next_expected_offset(&self, party: Party) -> u64 {
        self.sequence(party).next_offset()
    }

    /// Current version of an object, including local pending updates
    pub fn object(&self, object_id: &ObjectId) -> Option<&OffChainObject> {
        self.objects
            .get(object_id)
            .and_then(|chain| chain.head())
            .map(|link| &link.object)
    }

    /// Latest version of an object that both parties agree on
    pub fn confirmed_object(&self, object_id: &ObjectId) -> Option<&OffChainObject> {
        self.objects.get(object_id).and_then(|chain| {
            chain
                .links()
                .iter()
                .rev()
                .find(|link| !self.is_local_pending(link))
                .map(|link| &link.object)
        })
    }

    pub fn chain(&self, object_id: &ObjectId) -> Option<&ObjectChain> {
        self.objects.get(object_id)
    }

    /// Heads of every object in the channel
    pub fn objects(&self) -> impl Iterator<Item = &OffChainObject> {
        self.objects
            .values()
            .filter_map(|chain| chain.head())
            .map(|link| &link.object)
    }

    fn is_local_pending(&self, link: &Link) -> bool {
        link.author == Party::Local
            && self
                .local
                .get(link.offset)
                .is_some_and(|entry| entry.disposition.is_pending())
    }

    /// Relate a remote command to the local view without mutating anything
    pub fn classify_remote(&self, command: &Command) -> RemoteClass {
        let chain = self.objects.get(&command.object_id);
        let head = chain.and_then(|c| c.head()).map(|link| &link.object);
        if command.extends(head) {
            return RemoteClass::Extends;
        }

        let head_version = chain.map_or(0, |c| c.version());
        let expected = command.expected_version;
        if expected >= head_version {
            return if expected == head_version {
                RemoteClass::Stale(RejectReason::StaleParent)
            } else {
                RemoteClass::Stale(RejectReason::InvalidTransition {
                    expected,
                    actual: head_version,
                })
            };
        }

        // expected < head_version, so the chain exists
        let Some(chain) = chain else {
            return RemoteClass::Stale(RejectReason::StaleParent);
        };
        let prior = chain.at_version(expected).map(|link| &link.object);
        if !command.extends(prior) {
            return RemoteClass::Stale(RejectReason::StaleParent);
        }

        let successors = chain.after(expected);
        match successors.first() {
            Some(first) if successors.iter().all(|link| self.is_local_pending(link)) => {
                RemoteClass::Races {
                    local_offset: first.offset,
                }
            }
            _ => RemoteClass::Stale(RejectReason::InvalidTransition {
                expected,
                actual: head_version,
            }),
        }
    }

    /// Apply `command` to the head of its object and commit it for `party`.
    ///
    /// Local commands commit as pending, remote ones as applied. No domain
    /// validation happens here.
    pub fn commit(&mut self, party: Party, command: Command) -> Result<u64, JournalError> {
        let object = transition(self.object(&command.object_id), &command)?;
        Ok(self.commit_object(party, command, object))
    }

    /// Commit a command whose resulting version was already computed
    pub fn commit_object(&mut self, party: Party, command: Command, object: OffChainObject) -> u64 {
        let disposition = match party {
            Party::Local => Disposition::Pending,
            Party::Remote => Disposition::Applied,
        };
        let object_id = command.object_id.clone();
        let offset = self.sequence_mut(party).push(command, disposition);
        self.objects
            .entry(object_id.clone())
            .or_insert_with(|| ObjectChain::new(object_id))
            .push(Link {
                object,
                author: party,
                offset,
            });
        offset
    }

    /// Record a remote command that was refused; it occupies its offset but
    /// changes no object
    pub fn commit_rejected(&mut self, command: Command, reason: RejectReason) -> u64 {
        self.remote
            .push(command, Disposition::Rejected { reason })
    }

    /// Mark a pending local command as applied by the counterparty.
    ///
    /// Returns `false` when it was already applied.
    pub fn acknowledge(&mut self, offset: u64) -> Result<bool, JournalError> {
        let entry = self
            .local
            .get(offset)
            .ok_or(JournalError::UnknownOffset {
                party: Party::Local,
                offset,
            })?;
        match &entry.disposition {
            Disposition::Pending => {
                self.local.settle(offset, Disposition::Applied);
                Ok(true)
            }
            Disposition::Applied => Ok(false),
            current @ Disposition::Rejected { .. } => Err(JournalError::Contradiction {
                offset,
                current: current.clone(),
            }),
        }
    }

    /// Roll back a pending local command and every later local pending
    /// version of the same object.
    ///
    /// Returns the retracted offsets, `offset` first. Retracting an already
    /// rejected command is a no-op.
    pub fn retract(&mut self, offset: u64, reason: RejectReason) -> Result<Vec<u64>, JournalError> {
        let entry = self
            .local
            .get(offset)
            .ok_or(JournalError::UnknownOffset {
                party: Party::Local,
                offset,
            })?;
        match &entry.disposition {
            Disposition::Pending => {}
            Disposition::Rejected { .. } => return Ok(Vec::new()),
            current @ Disposition::Applied => {
                return Err(JournalError::Contradiction {
                    offset,
                    current: current.clone(),
                })
            }
        }

        let object_id = entry.command.object_id.clone();
        let version = entry.command.expected_version;
        let chain = self
            .objects
            .get(&object_id)
            .ok_or(JournalError::UnknownOffset {
                party: Party::Local,
                offset,
            })?;
        if let Some(blocking) = chain
            .after(version)
            .iter()
            .find(|link| !self.is_local_pending(link))
        {
            return Err(JournalError::RetractBlocked {
                offset,
                blocking_offset: blocking.offset,
                author: blocking.author,
            });
        }

        let removed = self
            .objects
            .get_mut(&object_id)
            .map(|chain| chain.truncate_to(version))
            .unwrap_or_default();
        if version == 0 {
            self.objects.remove(&object_id);
        }

        let mut retracted = Vec::with_capacity(removed.len());
        for link in removed {
            let link_reason = if link.offset == offset {
                reason.clone()
            } else {
                RejectReason::StaleParent
            };
            self.local.settle(
                link.offset,
                Disposition::Rejected {
                    reason: link_reason,
                },
            );
            retracted.push(link.offset);
        }
        tracing::debug!(
            channel = %self.channel_id,
            object = %object_id,
            ?retracted,
            "rolled back local pending versions"
        );
        Ok(retracted)
    }
}
