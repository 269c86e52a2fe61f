//! Durable record of what happened to each repository on previous runs.
//!
//! The snapshot is a single pretty-printed JSON object keyed by canonical
//! URL. It is loaded once per run, mutated in memory, and written back
//! after every job through a temp file that is renamed over the target, so
//! readers only ever see a complete snapshot.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::StateError;

pub const STATE_FILE_NAME: &str = "crawl-state.json";

/// What is remembered about one repository between runs.
///
/// A missing record behaves like `OutcomeRecord::default()`: nothing
/// succeeded and no fingerprint is known.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub fetch_succeeded: bool,
    pub artifact_succeeded: bool,
    #[serde(default)]
    pub last_fingerprint: Option<String>,
    pub last_attempt_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl OutcomeRecord {
    /// Both the checkout and the artifact are current.
    pub fn is_complete(&self) -> bool {
        self.fetch_succeeded && self.artifact_succeeded
    }
}

/// How the snapshot was obtained at load time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    /// No state file yet.
    Fresh,
    Loaded(usize),
    /// The file was unreadable and the run starts from an empty snapshot.
    Recovered(String),
}

/// Single-writer owner of the outcome snapshot.
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    records: BTreeMap<String, OutcomeRecord>,
    dirty: bool,
}

impl StateStore {
    /// An empty store that will persist to `path`.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            records: BTreeMap::new(),
            dirty: false,
        }
    }

    /// Load the snapshot at `path`. Never fails: an unreadable file yields
    /// an empty store and [`LoadStatus::Recovered`]. The unreadable file is
    /// moved aside to `<name>.corrupt` so the next persist does not erase it.
    pub fn load(path: impl Into<PathBuf>) -> (Self, LoadStatus) {
        let path = path.into();
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return (Self::empty(path), LoadStatus::Fresh);
            }
            Err(e) => return Self::recover(path, e.to_string()),
        };

        match serde_json::from_str::<BTreeMap<String, OutcomeRecord>>(&contents) {
            Ok(records) => {
                let count = records.len();
                debug!(path = %path.display(), records = count, "loaded crawl state");
                let store = Self {
                    path,
                    records,
                    dirty: false,
                };
                (store, LoadStatus::Loaded(count))
            }
            Err(e) => Self::recover(path, e.to_string()),
        }
    }

    fn recover(path: PathBuf, reason: String) -> (Self, LoadStatus) {
        let err = StateError::Corrupt {
            path: path.clone(),
            reason: reason.clone(),
        };
        warn!(error = %err, "starting from an empty crawl state");

        let mut aside = path.clone().into_os_string();
        aside.push(".corrupt");
        if let Err(e) = std::fs::rename(&path, &aside) {
            warn!(error = %e, "could not move unreadable state file aside");
        }

        (Self::empty(path), LoadStatus::Recovered(reason))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&OutcomeRecord> {
        self.records.get(key)
    }

    /// Upsert in memory. Call [`persist`](Self::persist) to make it durable.
    pub fn update(&mut self, key: &str, record: OutcomeRecord) {
        self.records.insert(key.to_string(), record);
        self.dirty = true;
    }

    pub fn remove(&mut self, key: &str) -> Option<OutcomeRecord> {
        let removed = self.records.remove(key);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    pub fn clear(&mut self) -> usize {
        let count = self.records.len();
        if count > 0 {
            self.records.clear();
            self.dirty = true;
        }
        count
    }

    pub fn records(&self) -> impl Iterator<Item = (&String, &OutcomeRecord)> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// In-memory changes that have not reached disk yet.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Write the whole snapshot: temp file in the same directory, fsync,
    /// then rename over the target. The previous snapshot stays readable
    /// until the rename.
    pub fn persist(&mut self) -> Result<(), StateError> {
        let to_persist_err = |source: std::io::Error| StateError::Persist {
            path: self.path.clone(),
            source,
        };

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(to_persist_err)?;

        let json = serde_json::to_vec_pretty(&self.records)
            .map_err(|e| to_persist_err(std::io::Error::other(e)))?;

        let mut tmp = NamedTempFile::new_in(&dir).map_err(to_persist_err)?;
        tmp.write_all(&json).map_err(to_persist_err)?;
        tmp.write_all(b"\n").map_err(to_persist_err)?;
        tmp.as_file().sync_all().map_err(to_persist_err)?;
        tmp.persist(&self.path).map_err(|e| to_persist_err(e.error))?;

        self.dirty = false;
        debug!(path = %self.path.display(), records = self.records.len(), "persisted crawl state");
        Ok(())
    }
}
