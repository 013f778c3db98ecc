//! Restart from the journal and storage failure handling

#![allow(clippy::unwrap_used)]

use assert_matches::assert_matches;
use offchain_core::{
    AcceptAll, ChannelId, ObjectId, ObjectState, ObjectStatus, OffChainObject, Party, TieBreak,
    VaspId,
};
use offchain_journal::{
    CommandStore, JournalRecord, MemoryCommandStore, ObjectSnapshot, StoreError,
};
use offchain_sequencer::{ProposeOutcome, Sequencer, SequencerError, Verdict};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Memory store whose appends can be switched off
#[derive(Default)]
struct FlakyStore {
    inner: MemoryCommandStore,
    failing: AtomicBool,
}

impl CommandStore for FlakyStore {
    fn append(
        &self,
        channel: &ChannelId,
        record: &JournalRecord,
        objects: &[ObjectSnapshot],
    ) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Io("disk full".into()));
        }
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
        self.inner.journal(channel)
    }

    fn channels(&self) -> Result<Vec<ChannelId>, StoreError> {
        self.inner.channels()
    }
}

fn vasps() -> (VaspId, VaspId) {
    (
        VaspId::new_from_entropy([1u8; 32]),
        VaspId::new_from_entropy([2u8; 32]),
    )
}

fn open(store: Arc<dyn CommandStore>, local: VaspId, remote: VaspId) -> Sequencer {
    Sequencer::open(local, remote, store, Arc::new(AcceptAll), TieBreak::default()).unwrap()
}

#[test]
fn restart_reproduces_committed_state() {
    let (a, b) = vasps();
    let store: Arc<dyn CommandStore> = Arc::new(MemoryCommandStore::new());
    let mut bob = open(Arc::new(MemoryCommandStore::new()), b, a);

    let mut alice = open(store.clone(), a, b);
    let id = ObjectId::new("payment-1");
    let c0 = alice.draft(id.clone(), ObjectState::new(ObjectStatus::NeedsKycData));
    alice.propose(c0).unwrap();
    alice.apply_verdict(0, Verdict::Accepted).unwrap();
    let c1 = alice.draft(id.clone(), ObjectState::new(ObjectStatus::SoftMatch));
    alice.propose(c1).unwrap();

    let remote = bob.draft(ObjectId::new("payment-2"), ObjectState::new(ObjectStatus::NeedsStableId));
    alice.receive(remote, 0).unwrap();

    // Crash with offset 1 committed but unacknowledged
    let expected_objects: Vec<_> = alice.state().objects().cloned().collect();
    drop(alice);

    let mut restarted = open(store, a, b);
    let objects: Vec<_> = restarted.state().objects().cloned().collect();
    assert_eq!(objects, expected_objects);
    assert_eq!(restarted.next_expected_offset(Party::Remote), 1);
    assert_eq!(restarted.pending_local(), 1);
    assert_eq!(restarted.peer_cursor(), 1);

    let c2 = restarted.draft(ObjectId::new("payment-3"), ObjectState::new(ObjectStatus::NeedsKycData));
    assert_eq!(
        restarted.propose(c2).unwrap(),
        ProposeOutcome::Accepted { offset: 2 }
    );
}

#[test]
fn storage_failure_poisons_until_reopened() {
    let (a, b) = vasps();
    let store = Arc::new(FlakyStore::default());
    let mut alice = open(store.clone(), a, b);
    let id = ObjectId::new("payment-1");

    let c0 = alice.draft(id.clone(), ObjectState::new(ObjectStatus::NeedsKycData));
    alice.propose(c0).unwrap();

    store.failing.store(true, Ordering::SeqCst);
    let c1 = alice.draft(id.clone(), ObjectState::new(ObjectStatus::SoftMatch));
    assert_matches!(alice.propose(c1.clone()), Err(SequencerError::Store(_)));
    assert!(alice.is_poisoned());
    assert_matches!(
        alice.apply_verdict(0, Verdict::Accepted),
        Err(SequencerError::Poisoned)
    );

    store.failing.store(false, Ordering::SeqCst);
    let mut reopened = open(store, a, b);
    assert!(!reopened.is_poisoned());
    assert_eq!(reopened.next_expected_offset(Party::Local), 1);
    assert_eq!(reopened.object(&id).unwrap().version, 1);

    // The command that never reached storage can be proposed again
    assert_eq!(
        reopened.propose(c1).unwrap(),
        ProposeOutcome::Accepted { offset: 1 }
    );
}
