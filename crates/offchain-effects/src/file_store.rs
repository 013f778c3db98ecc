//! File-backed command store
//!
//! One JSON-lines file per channel (`<channel hex>.jsonl`). Each line holds
//! one journal record together with the object snapshots it produced, so a
//! line is the atomic unit of durability. Appends are flushed with
//! `fsync` before returning.
//!
//! Recovery on open is deterministic:
//! 1. Every line parses: clean.
//! 2. Only the final line is torn or unparsable: it is truncated away.
//! 3. Any earlier line is unparsable: the store refuses to open.
//!
//! A failed append truncates the file back to its previous length. The
//! channel is then reloaded from disk before its next use, so the in-memory
//! view never drifts from what a restart would see.

use offchain_core::{ChannelId, ObjectId, OffChainObject};
use offchain_journal::{CommandStore, JournalRecord, ObjectSnapshot, StoreError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, OpenOptions};
use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

const EXTENSION: &str = "jsonl";

#[derive(Debug, Serialize, Deserialize)]
struct StoredLine {
    record: JournalRecord,
    objects: Vec<ObjectSnapshot>,
}

/// What opening a channel file found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileRecovery {
    Clean { records: usize },
    Truncated { records: usize, dropped_bytes: u64 },
}

/// Append target of one channel
trait LogFile: Write + Send + fmt::Debug {
    fn sync(&mut self) -> io::Result<()>;
    fn size(&self) -> io::Result<u64>;
    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

impl LogFile for File {
    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)?;
        self.sync_all()
    }
}

#[derive(Debug)]
struct ChannelFile {
    file: Box<dyn LogFile>,
    records: Vec<JournalRecord>,
    objects: BTreeMap<ObjectId, OffChainObject>,
    needs_reload: bool,
}

impl ChannelFile {
    fn empty(file: File) -> Self {
        Self {
            file: Box::new(file),
            records: Vec::new(),
            objects: BTreeMap::new(),
            needs_reload: false,
        }
    }

    /// Write one line durably, rolling the file back on failure
    fn write_line(&mut self, bytes: &[u8]) -> io::Result<()> {
        let len = self.file.size()?;
        if let Err(err) = write_durably(self.file.as_mut(), bytes) {
            self.needs_reload = true;
            if let Err(rollback) = self.file.truncate(len) {
                tracing::error!(error = %rollback, len, "could not roll back failed append");
            }
            return Err(err);
        }
        Ok(())
    }

    fn apply(&mut self, line: StoredLine) {
        for snapshot in line.objects {
            match snapshot.object {
                Some(object) => {
                    self.objects.insert(snapshot.object_id, object);
                }
                None => {
                    self.objects.remove(&snapshot.object_id);
                }
            }
        }
        self.records.push(line.record);
    }
}

fn write_durably(file: &mut dyn LogFile, bytes: &[u8]) -> io::Result<()> {
    file.write_all(bytes)?;
    file.flush()?;
    file.sync()
}

/// Durable store writing one file per channel under a directory
#[derive(Debug)]
pub struct FileCommandStore {
    dir: PathBuf,
    channels: Mutex<HashMap<ChannelId, ChannelFile>>,
}

impl FileCommandStore {
    /// Open (or create) a store directory, recovering every channel file
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let mut channels = HashMap::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let Some(channel) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| ChannelId::from_str(s).ok())
            else {
                tracing::warn!(path = %path.display(), "ignoring unrecognized file in store");
                continue;
            };
            let (file, recovery) = load(&path, channel)?;
            match recovery {
                FileRecovery::Clean { records } => {
                    tracing::debug!(%channel, records, "channel file loaded");
                }
                FileRecovery::Truncated {
                    records,
                    dropped_bytes,
                } => {
                    tracing::warn!(%channel, records, dropped_bytes, "torn tail truncated");
                }
            }
            channels.insert(channel, file);
        }

        tracing::info!(dir = %dir.display(), channels = channels.len(), "file store opened");
        Ok(Self {
            dir,
            channels: Mutex::new(channels),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, channel: &ChannelId) -> PathBuf {
        self.dir.join(format!("{}.{EXTENSION}", channel.to_hex()))
    }

    /// Replace a channel whose last append failed with what is on disk
    fn refresh(
        &self,
        channels: &mut HashMap<ChannelId, ChannelFile>,
        channel: &ChannelId,
    ) -> Result<(), StoreError> {
        if !channels.get(channel).is_some_and(|c| c.needs_reload) {
            return Ok(());
        }
        let (file, recovery) = load(&self.path_for(channel), *channel)?;
        tracing::warn!(%channel, ?recovery, "channel reloaded after failed append");
        channels.insert(*channel, file);
        Ok(())
    }

    /// Recovery result of a channel file, reading it again from disk
    pub fn inspect(path: &Path) -> Result<(Vec<JournalRecord>, FileRecovery), StoreError> {
        let content = fs::read(path)?;
        let channel = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| ChannelId::from_str(s).ok())
            .ok_or_else(|| StoreError::Io(format!("{} is not a channel file", path.display())))?;
        let scan = scan(&content, channel)?;
        let records = scan.lines.into_iter().map(|line| line.record).collect();
        Ok((records, scan.recovery))
    }
}

struct Scan {
    lines: Vec<StoredLine>,
    valid_len: u64,
    recovery: FileRecovery,
}

fn scan(content: &[u8], channel: ChannelId) -> Result<Scan, StoreError> {
    let mut lines = Vec::new();
    let mut offset = 0usize;
    let mut line_no = 0usize;

    while offset < content.len() {
        line_no += 1;
        let rest = &content[offset..];
        let Some(end) = rest.iter().position(|b| *b == b'\n') else {
            return Ok(torn(lines, offset, content.len()));
        };
        match serde_json::from_slice::<StoredLine>(&rest[..end]) {
            Ok(parsed) => {
                lines.push(parsed);
                offset += end + 1;
            }
            Err(_) if offset + end + 1 == content.len() => {
                return Ok(torn(lines, offset, content.len()));
            }
            Err(err) => {
                return Err(StoreError::Corrupt {
                    channel,
                    line: line_no,
                    detail: err.to_string(),
                })
            }
        }
    }

    let records = lines.len();
    Ok(Scan {
        lines,
        valid_len: content.len() as u64,
        recovery: FileRecovery::Clean { records },
    })
}

fn torn(lines: Vec<StoredLine>, valid_len: usize, total: usize) -> Scan {
    let records = lines.len();
    Scan {
        lines,
        valid_len: valid_len as u64,
        recovery: FileRecovery::Truncated {
            records,
            dropped_bytes: (total - valid_len) as u64,
        },
    }
}

fn load(path: &Path, channel: ChannelId) -> Result<(ChannelFile, FileRecovery), StoreError> {
    let content = fs::read(path)?;
    let scan = scan(&content, channel)?;

    let file = OpenOptions::new().read(true).append(true).open(path)?;
    if scan.valid_len < content.len() as u64 {
        file.set_len(scan.valid_len)?;
        file.sync_all()?;
    }

    let mut channel_file = ChannelFile::empty(file);
    for line in scan.lines {
        channel_file.apply(line);
    }
    Ok((channel_file, scan.recovery))
}

impl CommandStore for FileCommandStore {
    fn append(
        &self,
        channel: &ChannelId,
        record: &JournalRecord,
        objects: &[ObjectSnapshot],
    ) -> Result<(), StoreError> {
        let line = StoredLine {
            record: record.clone(),
            objects: objects.to_vec(),
        };
        let mut bytes =
            serde_json::to_vec(&line).map_err(|e| StoreError::Serialization(e.to_string()))?;
        bytes.push(b'\n');

        let mut channels = self.channels.lock();
        self.refresh(&mut channels, channel)?;
        if !channels.contains_key(channel) {
            let file = OpenOptions::new()
                .create(true)
                .read(true)
                .append(true)
                .open(self.path_for(channel))?;
            channels.insert(*channel, ChannelFile::empty(file));
        }
        let channel_file = channels
            .get_mut(channel)
            .ok_or_else(|| StoreError::Unavailable(format!("{channel} not open")))?;

        // The in-memory view only advances once the line is durable
        channel_file.write_line(&bytes)?;
        channel_file.apply(line);
        Ok(())
    }

    fn get_object(
        &self,
        channel: &ChannelId,
        object_id: &ObjectId,
    ) -> Result<Option<OffChainObject>, StoreError> {
        let mut channels = self.channels.lock();
        self.refresh(&mut channels, channel)?;
        Ok(channels
            .get(channel)
            .and_then(|c| c.objects.get(object_id).cloned()))
    }

    fn journal(&self, channel: &ChannelId) -> Result<Vec<JournalRecord>, StoreError> {
        let mut channels = self.channels.lock();
        self.refresh(&mut channels, channel)?;
        Ok(channels
            .get(channel)
            .map(|c| c.records.clone())
            .unwrap_or_default())
    }

    fn channels(&self) -> Result<Vec<ChannelId>, StoreError> {
        let mut ids: Vec<ChannelId> = self.channels.lock().keys().copied().collect();
        ids.sort();
        Ok(ids)
    }
}
