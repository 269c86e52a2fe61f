//! Deterministic collaborators for engine and runner tests.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tempfile::TempDir;

use crate::error::{ArtifactError, FetchError};
use crate::generate::{ArtifactGenerator, ArtifactInfo};
use crate::state_machine::Job;
use crate::store::{STATE_FILE_NAME, StateStore};
use crate::sync::{Change, FingerprintOracle, SyncOutcome};

enum ScriptedSync {
    Synced(String, Change),
    Failed(String),
}

/// Oracle that replays scripted outcomes per URL. Once the script runs out
/// it reports the last fingerprint as unchanged.
#[derive(Default)]
pub struct FakeOracle {
    scripts: Mutex<HashMap<String, VecDeque<ScriptedSync>>>,
    last: Mutex<HashMap<String, String>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl FakeOracle {
    pub fn push_synced(&self, url: &str, fingerprint: &str, change: Change) {
        self.push(url, ScriptedSync::Synced(fingerprint.to_string(), change));
    }

    pub fn push_failed(&self, url: &str, reason: &str) {
        self.push(url, ScriptedSync::Failed(reason.to_string()));
    }

    fn push(&self, url: &str, step: ScriptedSync) {
        self.scripts
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(step);
    }

    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }
}

impl FingerprintOracle for FakeOracle {
    async fn sync(&self, job: &Job) -> SyncOutcome {
        *self.calls.lock().unwrap().entry(job.url.clone()).or_default() += 1;

        let step = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&job.url)
            .and_then(VecDeque::pop_front);
        match step {
            Some(ScriptedSync::Synced(fingerprint, change)) => {
                self.last
                    .lock()
                    .unwrap()
                    .insert(job.url.clone(), fingerprint.clone());
                SyncOutcome::Synced {
                    fingerprint: Some(fingerprint),
                    change,
                }
            }
            Some(ScriptedSync::Failed(reason)) => {
                SyncOutcome::Failed(FetchError::Fetch(git2::Error::from_str(&reason)))
            }
            None => SyncOutcome::Synced {
                fingerprint: self.last.lock().unwrap().get(&job.url).cloned(),
                change: Change::Unchanged,
            },
        }
    }
}

enum ScriptedGeneration {
    Failure(String),
    /// Reports success without writing anything.
    SilentSuccess,
}

/// Generator that writes a small artifact unless a failure is scripted.
#[derive(Default)]
pub struct FakeGenerator {
    scripts: Mutex<HashMap<String, VecDeque<ScriptedGeneration>>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl FakeGenerator {
    pub fn push_failure(&self, url: &str, reason: &str) {
        self.push(url, ScriptedGeneration::Failure(reason.to_string()));
    }

    pub fn push_silent_success(&self, url: &str) {
        self.push(url, ScriptedGeneration::SilentSuccess);
    }

    fn push(&self, url: &str, step: ScriptedGeneration) {
        self.scripts
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(step);
    }

    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }
}

impl ArtifactGenerator for FakeGenerator {
    async fn generate(&self, job: &Job, _source: &Path) -> Result<ArtifactInfo, ArtifactError> {
        *self.calls.lock().unwrap().entry(job.url.clone()).or_default() += 1;

        let step = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&job.url)
            .and_then(VecDeque::pop_front);
        match step {
            Some(ScriptedGeneration::Failure(reason)) => Err(ArtifactError::CommandFailed {
                program: "fake".into(),
                status: "exit status: 1".into(),
                stderr: reason,
            }),
            Some(ScriptedGeneration::SilentSuccess) => Ok(ArtifactInfo { bytes: 0 }),
            None => {
                let contents = format!("digest of {}\n", job.url);
                std::fs::create_dir_all(job.artifact_path.parent().unwrap())?;
                std::fs::write(&job.artifact_path, &contents)?;
                Ok(ArtifactInfo {
                    bytes: contents.len() as u64,
                })
            }
        }
    }
}

/// A temporary data directory with jobs for `urls`.
pub struct Fixture {
    pub dir: TempDir,
    pub jobs: Vec<Job>,
}

pub fn fixture(urls: &[&str]) -> Fixture {
    let dir = TempDir::new().unwrap();
    let jobs = urls
        .iter()
        .map(|url| Job::new(url, dir.path()).unwrap())
        .collect();
    Fixture { dir, jobs }
}

impl Fixture {
    pub fn state_path(&self) -> PathBuf {
        self.dir.path().join(STATE_FILE_NAME)
    }

    /// A fresh empty store backed by this fixture's state file.
    pub fn store(&self) -> StateStore {
        StateStore::empty(self.state_path())
    }

    /// Whatever is on disk right now, as a new run would see it.
    pub fn reload(&self) -> StateStore {
        StateStore::load(self.state_path()).0
    }

    /// A store whose parent directory is a regular file, so every persist fails.
    pub fn unwritable_store(&self) -> StateStore {
        let blocker = self.dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();
        StateStore::empty(blocker.join(STATE_FILE_NAME))
    }
}
