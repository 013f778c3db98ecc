//! Durability and tail repair of the file store

#![allow(clippy::unwrap_used)]

use assert_matches::assert_matches;
use offchain_core::{AcceptAll, ChannelId, ObjectId, ObjectState, ObjectStatus, Party, TieBreak, VaspId};
use offchain_effects::{FileCommandStore, FileRecovery};
use offchain_journal::{CommandStore, StoreError};
use offchain_sequencer::Sequencer;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn vasps() -> (VaspId, VaspId) {
    (
        VaspId::new_from_entropy([1u8; 32]),
        VaspId::new_from_entropy([2u8; 32]),
    )
}

fn open(dir: &Path) -> (Arc<FileCommandStore>, Sequencer) {
    let (a, b) = vasps();
    let store = Arc::new(FileCommandStore::open(dir).unwrap());
    let sequencer = Sequencer::open(a, b, store.clone(), Arc::new(AcceptAll), TieBreak::default())
        .unwrap();
    (store, sequencer)
}

/// Propose `count` creations and return the channel file path
fn populate(dir: &Path, count: usize) -> PathBuf {
    let (_, mut sequencer) = open(dir);
    for i in 0..count {
        let command = sequencer.draft(
            ObjectId::new(format!("payment-{i}")),
            ObjectState::new(ObjectStatus::NeedsKycData),
        );
        sequencer.propose(command).unwrap();
    }
    let (a, b) = vasps();
    dir.join(format!("{}.jsonl", ChannelId::between(a, b).to_hex()))
}

fn append_raw(path: &Path, bytes: &[u8]) {
    let mut file = OpenOptions::new().append(true).open(path).unwrap();
    file.write_all(bytes).unwrap();
}

#[test]
fn reopen_restores_sequences_and_objects() {
    let dir = tempfile::tempdir().unwrap();
    populate(dir.path(), 3);

    let (store, sequencer) = open(dir.path());
    assert_eq!(sequencer.state().sequence(Party::Local).len(), 3);
    assert_eq!(sequencer.pending_local(), 3);

    let object_id = ObjectId::new("payment-1");
    let object = sequencer.object(&object_id).unwrap();
    assert_eq!(object.version, 1);
    assert_eq!(
        store.get_object(&sequencer.channel_id(), &object_id).unwrap().as_ref(),
        Some(object)
    );
    assert_eq!(store.channels().unwrap(), vec![sequencer.channel_id()]);
}

#[test]
fn torn_tail_is_truncated() {
    let dir = tempfile::tempdir().unwrap();
    let path = populate(dir.path(), 2);
    let clean_len = std::fs::metadata(&path).unwrap().len();
    append_raw(&path, br#"{"record":{"Local"#);

    let (_, recovery) = FileCommandStore::inspect(&path).unwrap();
    assert_eq!(
        recovery,
        FileRecovery::Truncated {
            records: 2,
            dropped_bytes: 17
        }
    );

    let (_, sequencer) = open(dir.path());
    assert_eq!(sequencer.state().sequence(Party::Local).len(), 2);
    assert_eq!(std::fs::metadata(&path).unwrap().len(), clean_len);
    assert_matches!(
        FileCommandStore::inspect(&path).unwrap().1,
        FileRecovery::Clean { records: 2 }
    );
}

#[test]
fn unparsable_final_line_is_truncated() {
    let dir = tempfile::tempdir().unwrap();
    let path = populate(dir.path(), 1);
    append_raw(&path, b"garbage\n");

    let (_, mut sequencer) = open(dir.path());
    assert_eq!(sequencer.state().sequence(Party::Local).len(), 1);

    // Appends continue after the repaired tail
    let command = sequencer.draft(
        ObjectId::new("payment-next"),
        ObjectState::new(ObjectStatus::NeedsKycData),
    );
    sequencer.propose(command).unwrap();
    drop(sequencer);

    let (records, recovery) = FileCommandStore::inspect(&path).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(recovery, FileRecovery::Clean { records: 2 });
}

#[test]
fn corruption_before_the_tail_refuses_to_open() {
    let dir = tempfile::tempdir().unwrap();
    let path = populate(dir.path(), 2);
    let content = std::fs::read_to_string(&path).unwrap();
    let mut lines: Vec<&str> = content.lines().collect();
    lines[0] = "not json";
    std::fs::write(&path, format!("{}\n", lines.join("\n"))).unwrap();

    assert_matches!(
        FileCommandStore::open(dir.path()),
        Err(StoreError::Corrupt { line: 1, .. })
    );
}

#[test]
fn unrelated_files_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("notes.txt"), "hello").unwrap();
    std::fs::write(dir.path().join("nothex.jsonl"), "junk\n").unwrap();

    let store = FileCommandStore::open(dir.path()).unwrap();
    assert!(store.channels().unwrap().is_empty());
}
