use std::fmt;

use serde::{Deserialize, Serialize};

/// The states a job passes through during one run.
///
/// ```text
/// NEEDS_FETCH → FETCHING → FETCH_FAILED
///                        → FETCHED → NEEDS_ARTIFACT_DECISION → SKIP
///                                                            → NEEDS_ARTIFACT → GENERATING → GEN_FAILED
///                                                                                          → GENERATED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    NeedsFetch,
    Fetching,
    FetchFailed,
    Fetched,
    NeedsArtifactDecision,
    Skip,
    NeedsArtifact,
    Generating,
    GenFailed,
    Generated,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::FetchFailed | JobState::Skip | JobState::GenFailed | JobState::Generated
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::NeedsFetch => "NEEDS_FETCH",
            JobState::Fetching => "FETCHING",
            JobState::FetchFailed => "FETCH_FAILED",
            JobState::Fetched => "FETCHED",
            JobState::NeedsArtifactDecision => "NEEDS_ARTIFACT_DECISION",
            JobState::Skip => "SKIP",
            JobState::NeedsArtifact => "NEEDS_ARTIFACT",
            JobState::Generating => "GENERATING",
            JobState::GenFailed => "GEN_FAILED",
            JobState::Generated => "GENERATED",
        };
        f.write_str(name)
    }
}

/// Things that happen to a job while the engine drives it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    StartFetch,
    FetchSucceeded,
    FetchFailed,
    Evaluate,
    ArtifactCurrent,
    ArtifactRequired,
    StartGeneration,
    GenerationSucceeded,
    GenerationFailed,
}

/// The result of applying an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Next(JobState),
    /// The event is not valid in the current state; nothing changed.
    Rejected { from: JobState, event: Event },
}

/// Records the path a single job takes through [`JobState`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobTrace {
    state: JobState,
    history: Vec<JobState>,
}

impl Default for JobTrace {
    fn default() -> Self {
        Self::new()
    }
}

impl JobTrace {
    pub fn new() -> Self {
        Self {
            state: JobState::NeedsFetch,
            history: Vec::new(),
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// Every state visited so far, including the current one.
    pub fn transitions(&self) -> Vec<JobState> {
        let mut all = self.history.clone();
        all.push(self.state);
        all
    }

    pub fn apply(&mut self, event: Event) -> Transition {
        use Event as E;
        use JobState as S;

        let next = match (self.state, event) {
            (S::NeedsFetch, E::StartFetch) => S::Fetching,
            (S::Fetching, E::FetchSucceeded) => S::Fetched,
            (S::Fetching, E::FetchFailed) => S::FetchFailed,
            (S::Fetched, E::Evaluate) => S::NeedsArtifactDecision,
            (S::NeedsArtifactDecision, E::ArtifactCurrent) => S::Skip,
            (S::NeedsArtifactDecision, E::ArtifactRequired) => S::NeedsArtifact,
            (S::NeedsArtifact, E::StartGeneration) => S::Generating,
            (S::Generating, E::GenerationSucceeded) => S::Generated,
            (S::Generating, E::GenerationFailed) => S::GenFailed,
            (from, event) => return Transition::Rejected { from, event },
        };

        self.history.push(self.state);
        self.state = next;
        Transition::Next(next)
    }
}
