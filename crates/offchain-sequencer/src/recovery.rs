//! Crash recovery
//!
//! The journal is authoritative. Object snapshots in the store are checked
//! against the replayed state and mismatches are reported, not repaired.

use crate::error::SequencerError;
use offchain_core::{Party, VaspId};
use offchain_journal::{ChannelState, CommandStore};

/// Summary of one channel rebuild
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Journal records replayed
    pub records: usize,
    /// Local commands still waiting for a verdict
    pub pending: usize,
    /// Where outbound synchronization resumes
    pub peer_cursor: u64,
    /// Objects whose stored snapshot disagrees with the journal
    pub snapshot_mismatches: usize,
}

/// Rebuild channel state from the store's journal
pub fn rebuild(
    local: VaspId,
    remote: VaspId,
    store: &dyn CommandStore,
) -> Result<(ChannelState, RecoveryReport), SequencerError> {
    let channel = offchain_core::ChannelId::between(local, remote);
    let records = store.journal(&channel)?;
    let count = records.len();
    let state = ChannelState::replay(local, remote, records)?;

    let local_seq = state.sequence(Party::Local);
    // Anything from the first pending command on may not have reached the peer
    let peer_cursor = local_seq
        .first_pending()
        .unwrap_or_else(|| local_seq.next_offset());
    let pending = local_seq.pending_count();

    let mut snapshot_mismatches = 0;
    for object in state.objects() {
        let stored = store.get_object(&channel, &object.object_id)?;
        if stored.as_ref() != Some(object) {
            snapshot_mismatches += 1;
            tracing::warn!(
                channel = %channel,
                object = %object.object_id,
                journal_version = object.version,
                stored_version = ?stored.map(|o| o.version),
                "stored object snapshot disagrees with journal"
            );
        }
    }

    Ok((
        state,
        RecoveryReport {
            records: count,
            pending,
            peer_cursor,
            snapshot_mismatches,
        },
    ))
}
