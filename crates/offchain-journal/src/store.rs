//! Command log storage interface
//!
//! The store is the only durable state of a channel. Appends must be durable
//! before they return; the sequencer answers the counterparty only after a
//! successful append.

use crate::record::JournalRecord;
use offchain_core::{ChannelId, Command, ObjectId, OffChainObject, Party};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Latest version of one object after a record was applied; `None` once a
/// rolled-back creation removed it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSnapshot {
    pub object_id: ObjectId,
    pub object: Option<OffChainObject>,
}

/// Storage failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("corrupt journal for {channel} at line {line}: {detail}")]
    Corrupt {
        channel: ChannelId,
        line: usize,
        detail: String,
    },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

/// Durable per-channel command log
pub trait CommandStore: Send + Sync {
    /// Append `record` and the object versions it produced, atomically
    fn append(
        &self,
        channel: &ChannelId,
        record: &JournalRecord,
        objects: &[ObjectSnapshot],
    ) -> Result<(), StoreError>;

    /// Latest stored version of an object
    fn get_object(
        &self,
        channel: &ChannelId,
        object_id: &ObjectId,
    ) -> Result<Option<OffChainObject>, StoreError>;

    /// Commands of `party` from `offset` onwards, in offset order
    fn get_sequence_from(
        &self,
        channel: &ChannelId,
        party: Party,
        offset: u64,
    ) -> Result<Vec<Command>, StoreError> {
        let records = self.journal(channel)?;
        Ok(sequence_from_records(&records, party, offset))
    }

    /// Every record of the channel in append order
    fn journal(&self, channel: &ChannelId) -> Result<Vec<JournalRecord>, StoreError>;

    /// Channels with at least one record
    fn channels(&self) -> Result<Vec<ChannelId>, StoreError>;
}

/// Commands introduced for `party` at or after `offset`
pub fn sequence_from_records(records: &[JournalRecord], party: Party, offset: u64) -> Vec<Command> {
    records
        .iter()
        .filter(|record| record.party() == party && record.offset() >= offset)
        .filter_map(|record| record.command().cloned())
        .collect()
}

#[derive(Debug, Default)]
struct ChannelLog {
    records: Vec<JournalRecord>,
    objects: BTreeMap<ObjectId, OffChainObject>,
}

impl ChannelLog {
    fn apply(&mut self, record: &JournalRecord, objects: &[ObjectSnapshot]) {
        self.records.push(record.clone());
        for snapshot in objects {
            match &snapshot.object {
                Some(object) => {
                    self.objects
                        .insert(snapshot.object_id.clone(), object.clone());
                }
                None => {
                    self.objects.remove(&snapshot.object_id);
                }
            }
        }
    }
}

/// In-memory command store for tests and simulation
#[derive(Debug, Default)]
pub struct MemoryCommandStore {
    channels: RwLock<HashMap<ChannelId, ChannelLog>>,
}

impl MemoryCommandStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records stored for a channel
    pub fn record_count(&self, channel: &ChannelId) -> usize {
        self.channels
            .read()
            .get(channel)
            .map_or(0, |log| log.records.len())
    }
}

impl CommandStore for MemoryCommandStore {
    fn append(
        &self,
        channel: &ChannelId,
        record: &JournalRecord,
        objects: &[ObjectSnapshot],
    ) -> Result<(), StoreError> {
        self.channels
            .write()
            .entry(*channel)
            .or_default()
            .apply(record, objects);
        Ok(())
    }

    fn get_object(
        &self,
        channel: &ChannelId,
        object_id: &ObjectId,
    ) -> Result<Option<OffChainObject>, StoreError> {
        Ok(self
            .channels
            .read()
            .get(channel)
            .and_then(|log| log.objects.get(object_id).cloned()))
    }

    fn journal(&self, channel: &ChannelId) -> Result<Vec<JournalRecord>, StoreError> {
        Ok(self
            .channels
            .read()
            .get(channel)
            .map(|log| log.records.clone())
            .unwrap_or_default())
    }

    fn channels(&self) -> Result<Vec<ChannelId>, StoreError> {
        let mut ids: Vec<ChannelId> = self.channels.read().keys().copied().collect();
        ids.sort_by(|a, b| a.as_bytes().cmp(b.as_bytes()));
        Ok(ids)
    }
}
