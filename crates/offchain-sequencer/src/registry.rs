//! Table of open channels, keyed by counterparty
//!
//! Owned by the hosting process. Each channel has its own lock; there is no
//! lock spanning channels beyond the short table lookup.

use crate::error::SequencerError;
use crate::sequencer::Sequencer;
use offchain_core::{TieBreak, Validator, VaspId};
use offchain_journal::CommandStore;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

/// Shared handle to one channel's sequencer
pub type SharedSequencer = Arc<Mutex<Sequencer>>;

/// Open channels of the local VASP
pub struct ChannelRegistry {
    local: VaspId,
    store: Arc<dyn CommandStore>,
    validator: Arc<dyn Validator>,
    tie_break: TieBreak,
    channels: RwLock<HashMap<VaspId, SharedSequencer>>,
}

impl ChannelRegistry {
    pub fn new(
        local: VaspId,
        store: Arc<dyn CommandStore>,
        validator: Arc<dyn Validator>,
        tie_break: TieBreak,
    ) -> Self {
        Self {
            local,
            store,
            validator,
            tie_break,
            channels: RwLock::new(HashMap::new()),
        }
    }

    pub fn local_id(&self) -> VaspId {
        self.local
    }

    /// Channel with `remote`, opening (and recovering) it on first use
    pub fn channel(&self, remote: VaspId) -> Result<SharedSequencer, SequencerError> {
        if let Some(existing) = self.channels.read().get(&remote) {
            return Ok(existing.clone());
        }
        // Recovery reads the whole journal; other channels stay reachable
        // meanwhile. A concurrent opener of the same channel may win the
        // insert, in which case this replay is discarded.
        let opened = Arc::new(Mutex::new(self.open_sequencer(remote)?));
        Ok(self
            .channels
            .write()
            .entry(remote)
            .or_insert(opened)
            .clone())
    }

    /// Channel with `remote` if already open
    pub fn get(&self, remote: &VaspId) -> Option<SharedSequencer> {
        self.channels.read().get(remote).cloned()
    }

    /// Replace the channel with a fresh sequencer rebuilt from the store,
    /// clearing a poisoned state
    pub fn reopen(&self, remote: VaspId) -> Result<SharedSequencer, SequencerError> {
        let sequencer = self.open_sequencer(remote)?;
        let shared = Arc::new(Mutex::new(sequencer));
        self.channels.write().insert(remote, shared.clone());
        tracing::info!(peer = %remote, "channel reopened from storage");
        Ok(shared)
    }

    /// Forget a channel; its journal stays in the store
    pub fn close(&self, remote: &VaspId) -> bool {
        self.channels.write().remove(remote).is_some()
    }

    /// Counterparties with an open channel
    pub fn peers(&self) -> Vec<VaspId> {
        let mut peers: Vec<VaspId> = self.channels.read().keys().copied().collect();
        peers.sort();
        peers
    }

    fn open_sequencer(&self, remote: VaspId) -> Result<Sequencer, SequencerError> {
        Sequencer::open(
            self.local,
            remote,
            self.store.clone(),
            self.validator.clone(),
            self.tie_break,
        )
    }
}

impl std::fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("local", &self.local)
            .field("peers", &self.peers())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use offchain_core::{AcceptAll, ChannelId, ObjectId, ObjectState, ObjectStatus, OffChainObject};
    use offchain_journal::{JournalRecord, MemoryCommandStore, ObjectSnapshot, StoreError};
    use std::sync::mpsc;
    use std::time::Duration;

    /// Memory store whose journal read for one channel waits for a release
    struct GatedStore {
        inner: MemoryCommandStore,
        gated: ChannelId,
        entered: Mutex<Option<mpsc::Sender<()>>>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl CommandStore for GatedStore {
        fn append(
            &self,
            channel: &ChannelId,
            record: &JournalRecord,
            objects: &[ObjectSnapshot],
        ) -> Result<(), StoreError> {
            self.inner.append(channel, record, objects)
        }

        fn get_object(
            &self,
            channel: &ChannelId,
            object_id: &ObjectId,
        ) -> Result<Option<OffChainObject>, StoreError> {
            self.inner.get_object(channel, object_id)
        }

        fn journal(&self, channel: &ChannelId) -> Result<Vec<JournalRecord>, StoreError> {
            if *channel == self.gated {
                if let Some(entered) = self.entered.lock().take() {
                    entered.send(()).unwrap();
                    self.release.lock().recv().unwrap();
                }
            }
            self.inner.journal(channel)
        }

        fn channels(&self) -> Result<Vec<ChannelId>, StoreError> {
            self.inner.channels()
        }
    }

    #[test]
    fn test_recovering_channel_does_not_block_others() {
        let local = VaspId::new_from_entropy([1u8; 32]);
        let slow = VaspId::new_from_entropy([2u8; 32]);
        let fast = VaspId::new_from_entropy([3u8; 32]);
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let registry = Arc::new(ChannelRegistry::new(
            local,
            Arc::new(GatedStore {
                inner: MemoryCommandStore::new(),
                gated: ChannelId::between(local, slow),
                entered: Mutex::new(Some(entered_tx)),
                release: Mutex::new(release_rx),
            }),
            Arc::new(AcceptAll),
            TieBreak::default(),
        ));

        let recovering = {
            let registry = registry.clone();
            std::thread::spawn(move || registry.channel(slow).map(|_| ()))
        };
        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        let (done_tx, done_rx) = mpsc::channel();
        {
            let registry = registry.clone();
            std::thread::spawn(move || {
                let _ = done_tx.send(registry.channel(fast).is_ok());
            });
        }
        let other_opened = done_rx.recv_timeout(Duration::from_secs(5));
        release_tx.send(()).unwrap();

        assert_eq!(other_opened, Ok(true));
        recovering.join().unwrap().unwrap();
        assert_eq!(registry.peers().len(), 2);
    }

    #[test]
    fn test_channels_are_opened_once_and_survive_reopen() {
        let local = VaspId::new_from_entropy([1u8; 32]);
        let peer = VaspId::new_from_entropy([2u8; 32]);
        let registry = ChannelRegistry::new(
            local,
            Arc::new(MemoryCommandStore::new()),
            Arc::new(AcceptAll),
            TieBreak::default(),
        );

        let first = registry.channel(peer).unwrap();
        let second = registry.channel(peer).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.peers(), vec![peer]);

        {
            let mut seq = first.lock();
            let command = seq.draft(ObjectId::new("p1"), ObjectState::new(ObjectStatus::NeedsKycData));
            seq.propose(command).unwrap();
        }

        let reopened = registry.reopen(peer).unwrap();
        assert!(!Arc::ptr_eq(&first, &reopened));
        assert_eq!(
            reopened.lock().object(&ObjectId::new("p1")).map(|o| o.version),
            Some(1)
        );

        assert!(registry.close(&peer));
        assert!(registry.get(&peer).is_none());
    }
}
