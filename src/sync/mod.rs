//! Bringing a repository's local checkout up to date.

pub mod git;

pub use git::GitOracle;

use crate::error::FetchError;
use crate::state_machine::Job;

/// Whether the synchronized content moved since the last sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Changed,
    Unchanged,
    /// The oracle could not tell. Treated as changed.
    Unknown,
}

/// What a sync attempt produced.
#[derive(Debug)]
pub enum SyncOutcome {
    Synced {
        /// Opaque content token, e.g. the HEAD commit id.
        fingerprint: Option<String>,
        change: Change,
    },
    Failed(FetchError),
}

/// Synchronizes a job's local content and reports a fingerprint.
///
/// Implementations discard an unusable local copy themselves before
/// fetching fresh, and are idempotent: syncing an already-current job
/// reports [`Change::Unchanged`]. Timeouts surface as [`SyncOutcome::Failed`].
pub trait FingerprintOracle {
    async fn sync(&self, job: &Job) -> SyncOutcome;
}
