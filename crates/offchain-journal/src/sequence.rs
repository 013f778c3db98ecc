//! Append-only command sequences
//!
//! Each channel holds two sequences, one per author. Offsets are dense: once an
//! entry is committed at offset `k` its command never changes; only the
//! disposition of a local entry settles when the counterparty answers.

use offchain_core::{Command, Party, RejectReason};
use serde::{Deserialize, Serialize};

/// Fate of a sequenced command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Disposition {
    /// Local command applied speculatively, waiting for the counterparty
    Pending,
    /// Applied on both sides
    Applied,
    /// Not applied; the offset stays occupied
    Rejected { reason: RejectReason },
}

impl Disposition {
    pub fn is_pending(&self) -> bool {
        matches!(self, Disposition::Pending)
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Disposition::Applied)
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Disposition::Rejected { .. })
    }
}

/// One committed position of a sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceEntry {
    pub offset: u64,
    pub command: Command,
    pub disposition: Disposition,
}

/// Ordered, gap-free list of the commands one party authored
#[derive(Debug, Clone)]
pub struct Sequence {
    party: Party,
    entries: Vec<SequenceEntry>,
}

impl Sequence {
    pub fn new(party: Party) -> Self {
        Self {
            party,
            entries: Vec::new(),
        }
    }

    pub fn party(&self) -> Party {
        self.party
    }

    /// Offset the next committed command will take
    pub fn next_offset(&self) -> u64 {
        self.entries.len() as u64
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, offset: u64) -> Option<&SequenceEntry> {
        usize::try_from(offset).ok().and_then(|i| self.entries.get(i))
    }

    /// Entries from `offset` to the end
    pub fn from_offset(&self, offset: u64) -> &[SequenceEntry] {
        let start = usize::try_from(offset)
            .unwrap_or(usize::MAX)
            .min(self.entries.len());
        &self.entries[start..]
    }

    pub fn iter(&self) -> impl Iterator<Item = &SequenceEntry> {
        self.entries.iter()
    }

    /// Append at the next offset
    pub(crate) fn push(&mut self, command: Command, disposition: Disposition) -> u64 {
        let offset = self.next_offset();
        self.entries.push(SequenceEntry {
            offset,
            command,
            disposition,
        });
        offset
    }

    /// Replace the disposition at `offset`, returning the previous one
    pub(crate) fn settle(&mut self, offset: u64, disposition: Disposition) -> Option<Disposition> {
        let entry = usize::try_from(offset)
            .ok()
            .and_then(|i| self.entries.get_mut(i))?;
        Some(std::mem::replace(&mut entry.disposition, disposition))
    }

    /// Lowest offset still waiting for a verdict
    pub fn first_pending(&self) -> Option<u64> {
        self.entries
            .iter()
            .find(|e| e.disposition.is_pending())
            .map(|e| e.offset)
    }

    pub fn pending_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.disposition.is_pending())
            .count()
    }
}
