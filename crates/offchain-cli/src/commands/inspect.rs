//! Read-only inspection of a file store
//!
//! Files are scanned without repairing them, so a torn tail is reported but
//! left in place for the next open.

use crate::config::NodeConfig;
use anyhow::{Context, Result};
use clap::Args;
use offchain_effects::{FileCommandStore, FileRecovery};
use offchain_journal::{JournalRecord, RemoteVerdict};
use std::fs;
use std::path::{Path, PathBuf};

/// Inspect command
#[derive(Args)]
pub struct InspectCommand {
    /// Store directory; defaults to the configured one
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// Only the channel with this hex id
    #[arg(long)]
    pub channel: Option<String>,

    /// Print every record as JSON
    #[arg(long)]
    pub records: bool,
}

/// Record counts of one channel journal
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ChannelSummary {
    pub channel: String,
    pub local_committed: usize,
    pub acknowledged: usize,
    pub retracted: usize,
    pub remote_applied: usize,
    pub remote_rejected: usize,
    pub torn_bytes: u64,
}

impl ChannelSummary {
    fn from_records(channel: String, records: &[JournalRecord], recovery: FileRecovery) -> Self {
        let mut summary = Self {
            channel,
            ..Self::default()
        };
        if let FileRecovery::Truncated { dropped_bytes, .. } = recovery {
            summary.torn_bytes = dropped_bytes;
        }
        for record in records {
            match record {
                JournalRecord::LocalCommitted { .. } => summary.local_committed += 1,
                JournalRecord::Acknowledged { .. } => summary.acknowledged += 1,
                JournalRecord::Retracted { .. } => summary.retracted += 1,
                JournalRecord::RemoteCommitted {
                    verdict: RemoteVerdict::Applied { .. },
                    ..
                } => summary.remote_applied += 1,
                JournalRecord::RemoteCommitted {
                    verdict: RemoteVerdict::Rejected { .. },
                    ..
                } => summary.remote_rejected += 1,
            }
        }
        summary
    }

    /// Local commands still waiting for the counterparty
    pub fn pending(&self) -> usize {
        self.local_committed
            .saturating_sub(self.acknowledged + self.retracted)
    }
}

/// Run the inspect command
pub fn run(cmd: &InspectCommand, config: &NodeConfig) -> Result<()> {
    let dir = cmd.dir.clone().unwrap_or_else(|| config.store_dir.clone());
    let files = channel_files(&dir, cmd.channel.as_deref())?;
    if files.is_empty() {
        println!("No channel journals in {}", dir.display());
        return Ok(());
    }

    for path in files {
        let (records, recovery) = FileCommandStore::inspect(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let channel = file_channel(&path).unwrap_or_default();
        let summary = ChannelSummary::from_records(channel, &records, recovery);
        println!("channel {}", summary.channel);
        println!(
            "  local: {} committed, {} acknowledged, {} retracted, {} pending",
            summary.local_committed,
            summary.acknowledged,
            summary.retracted,
            summary.pending()
        );
        println!(
            "  remote: {} applied, {} rejected",
            summary.remote_applied, summary.remote_rejected
        );
        if summary.torn_bytes > 0 {
            println!("  torn tail: {} bytes, repaired on next open", summary.torn_bytes);
        }
        if cmd.records {
            for record in &records {
                println!("  {}", serde_json::to_string(record)?);
            }
        }
    }
    Ok(())
}

fn file_channel(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
}

/// Journal files in `dir`, optionally restricted to one channel, sorted
fn channel_files(dir: &Path, channel: Option<&str>) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("listing {}", dir.display()))? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
            continue;
        }
        if let Some(wanted) = channel {
            if file_channel(&path).as_deref() != Some(wanted) {
                continue;
            }
        }
        files.push(path);
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use offchain_core::{AcceptAll, ObjectId, ObjectState, ObjectStatus, TieBreak, VaspId};
    use offchain_sequencer::{Sequencer, Verdict};
    use std::sync::Arc;

    fn populate(dir: &Path) -> String {
        let a = VaspId::new_from_entropy([1u8; 32]);
        let b = VaspId::new_from_entropy([2u8; 32]);
        let store = Arc::new(FileCommandStore::open(dir).unwrap());
        let mut sequencer =
            Sequencer::open(a, b, store, Arc::new(AcceptAll), TieBreak::default()).unwrap();
        for i in 0..3 {
            let command = sequencer.draft(
                ObjectId::new(format!("p-{i}")),
                ObjectState::new(ObjectStatus::NeedsKycData),
            );
            sequencer.propose(command).unwrap();
        }
        sequencer.apply_verdict(0, Verdict::Accepted).unwrap();
        sequencer.channel_id().to_hex()
    }

    #[test]
    fn test_summary_counts() {
        let dir = tempfile::tempdir().unwrap();
        let channel = populate(dir.path());

        let files = channel_files(dir.path(), None).unwrap();
        assert_eq!(files.len(), 1);
        let (records, recovery) = FileCommandStore::inspect(&files[0]).unwrap();
        let summary = ChannelSummary::from_records(channel.clone(), &records, recovery);
        assert_eq!(summary.channel, channel);
        assert_eq!(summary.local_committed, 3);
        assert_eq!(summary.acknowledged, 1);
        assert_eq!(summary.pending(), 2);
        assert_eq!(summary.torn_bytes, 0);
    }

    #[test]
    fn test_channel_filter() {
        let dir = tempfile::tempdir().unwrap();
        let channel = populate(dir.path());
        fs::write(dir.path().join("notes.txt"), "x").unwrap();

        assert_eq!(channel_files(dir.path(), Some(&channel)).unwrap().len(), 1);
        assert!(channel_files(dir.path(), Some("00ff")).unwrap().is_empty());
    }

    #[test]
    fn test_inspect_leaves_torn_tail() {
        let dir = tempfile::tempdir().unwrap();
        populate(dir.path());
        let path = channel_files(dir.path(), None).unwrap().remove(0);
        let mut content = fs::read(&path).unwrap();
        content.extend_from_slice(b"{\"partial");
        fs::write(&path, &content).unwrap();

        let (records, recovery) = FileCommandStore::inspect(&path).unwrap();
        let summary = ChannelSummary::from_records(String::new(), &records, recovery);
        assert_eq!(summary.torn_bytes, 9);
        assert_eq!(fs::read(&path).unwrap().len(), content.len());
    }
}
