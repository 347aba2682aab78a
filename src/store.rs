//! File persistence
//!
//! A store directory holds `snapshot.json`, the last compacted state, and
//! `events.jsonl`, every event recorded since that snapshot, one per line.
//! Loading imports the snapshot (if any) and replays the events on top.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Event, MessageFn};
use crate::error::ConsistencyError;
use crate::goaltree::Goals;
use crate::graph::Graph;
use crate::layers::{persistent_layers, replay_onto, PersistentStack};
use crate::snapshot::{self, Snapshot};

pub const SNAPSHOT_FILE: &str = "snapshot.json";
pub const EVENTS_FILE: &str = "events.jsonl";
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed data: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Stored goals are inconsistent: {0}")]
    Consistency(#[from] ConsistencyError),

    #[error("Unsupported snapshot version {0}")]
    UnsupportedVersion(u32),
}

/// On-disk envelope of a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSnapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub snapshot: Snapshot,
}

#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Opens a store directory, creating it when missing
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn events_path(&self) -> PathBuf {
        self.dir.join(EVENTS_FILE)
    }

    fn snapshot_path(&self) -> PathBuf {
        self.dir.join(SNAPSHOT_FILE)
    }

    /// Whether nothing was ever saved here
    pub fn is_empty(&self) -> bool {
        !self.events_path().exists() && !self.snapshot_path().exists()
    }

    /// Appends events to the log
    pub fn append(&self, events: &[Event]) -> Result<(), StoreError> {
        if events.is_empty() {
            return Ok(());
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.events_path())?;
        let mut buffer = String::new();
        for event in events {
            buffer.push_str(&serde_json::to_string(event)?);
            buffer.push('\n');
        }
        file.write_all(buffer.as_bytes())?;
        file.sync_data()?;
        tracing::debug!(count = events.len(), "events appended");
        Ok(())
    }

    pub fn read_events(&self) -> Result<Vec<Event>, StoreError> {
        let path = self.events_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(File::open(path)?);
        let mut events = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            events.push(serde_json::from_str(&line)?);
        }
        Ok(events)
    }

    /// Writes a snapshot through a temporary file and truncates the log
    pub fn write_snapshot(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let stored = StoredSnapshot {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            snapshot: snapshot.clone(),
        };
        let tmp = self.dir.join(format!("{}.tmp", SNAPSHOT_FILE));
        fs::write(&tmp, serde_json::to_vec_pretty(&stored)?)?;
        fs::rename(&tmp, self.snapshot_path())?;
        File::create(self.events_path())?;
        tracing::info!(dir = %self.dir.display(), "snapshot written");
        Ok(())
    }

    pub fn read_snapshot(&self) -> Result<Option<StoredSnapshot>, StoreError> {
        let path = self.snapshot_path();
        if !path.exists() {
            return Ok(None);
        }
        let stored: StoredSnapshot = serde_json::from_slice(&fs::read(path)?)?;
        if stored.version != SNAPSHOT_VERSION {
            return Err(StoreError::UnsupportedVersion(stored.version));
        }
        Ok(Some(stored))
    }

    /// Rebuilds the persistent layers from the snapshot and the event log
    pub fn load(&self, message_fn: Option<MessageFn>) -> Result<PersistentStack, StoreError> {
        let mut stack = match self.read_snapshot()? {
            Some(stored) => snapshot::import(stored.snapshot, message_fn)?,
            None => persistent_layers(Goals::empty(message_fn)),
        };
        let events = self.read_events()?;
        replay_onto(&mut stack, &events)?;
        stack.verify()?;
        tracing::info!(events = events.len(), "goals loaded");
        Ok(stack)
    }

    /// Moves the pending events of `graph` into the log
    pub fn save<G: Graph + ?Sized>(&self, graph: &mut G) -> Result<usize, StoreError> {
        let events = graph.events_mut().drain();
        self.append(&events)?;
        Ok(events.len())
    }

    /// Replaces the log with a snapshot of the current state
    pub fn compact(&self, stack: &mut PersistentStack) -> Result<(), StoreError> {
        self.save(stack)?;
        self.write_snapshot(&snapshot::export(stack))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Command;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_save_and_load_events() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        assert!(store.is_empty());

        let mut stack = persistent_layers(Goals::new("Root", None));
        stack.accept(Command::add("A", 1));
        stack.accept(Command::select(2));
        assert_eq!(store.save(&mut stack).unwrap(), 4);
        assert!(stack.events().is_empty());
        assert!(!store.is_empty());

        let loaded = store.load(None).unwrap();
        assert_eq!(loaded.q(), stack.q());
    }

    #[test]
    fn test_compact_then_continue() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        let mut stack = persistent_layers(Goals::new("Root", None));
        stack.accept(Command::add("A", 1));
        store.compact(&mut stack).unwrap();
        assert!(store.read_events().unwrap().is_empty());
        assert!(store.read_snapshot().unwrap().is_some());

        stack.accept(Command::add("B", 2));
        store.save(&mut stack).unwrap();

        let loaded = store.load(None).unwrap();
        assert_eq!(loaded.q(), stack.q());
    }

    #[test]
    fn test_malformed_log_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(EVENTS_FILE), "{\"event\": \"explode\"}\n").unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        assert!(matches!(store.load(None), Err(StoreError::Json(_))));
    }

    #[test]
    fn test_inconsistent_log_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        store
            .append(&[Event::Add {
                id: 2,
                name: "Orphan".to_string(),
                open: true,
            }])
            .unwrap();
        assert!(matches!(store.load(None), Err(StoreError::Consistency(_))));
    }
}
