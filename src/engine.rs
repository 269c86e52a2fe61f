use std::fmt;

use chrono::Utc;
use tracing::{Instrument, error, info, info_span, warn};

use crate::error::ArtifactError;
use crate::generate::ArtifactGenerator;
use crate::state_machine::{Event, Job, JobState, JobTrace, Transition};
use crate::store::{OutcomeRecord, StateStore};
use crate::sync::{Change, FingerprintOracle, SyncOutcome};

/// Why an artifact has to be (re)generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegenerateReason {
    /// No outcome recorded for this job yet.
    FirstRun,
    /// The last generation attempt failed or never happened.
    PreviousFailure,
    ContentChanged,
    /// The oracle could not tell whether content moved.
    ChangeUnknown,
    /// The oracle saw no change, but the stored fingerprint differs from the
    /// current one (e.g. a previous run updated the checkout and died).
    FingerprintMismatch,
    /// The artifact was removed out of band.
    ArtifactMissing,
}

impl fmt::Display for RegenerateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RegenerateReason::FirstRun => "first run",
            RegenerateReason::PreviousFailure => "previous attempt failed",
            RegenerateReason::ContentChanged => "content changed",
            RegenerateReason::ChangeUnknown => "change unknown",
            RegenerateReason::FingerprintMismatch => "fingerprint differs from recorded",
            RegenerateReason::ArtifactMissing => "artifact missing",
        };
        f.write_str(text)
    }
}

/// Decide whether a freshly synced job needs its artifact regenerated.
/// `None` means the existing artifact is current.
pub fn decide(
    prior: Option<&OutcomeRecord>,
    fingerprint: Option<&str>,
    change: Change,
    artifact_present: bool,
) -> Option<RegenerateReason> {
    let Some(prior) = prior else {
        return Some(RegenerateReason::FirstRun);
    };
    if !prior.artifact_succeeded {
        return Some(RegenerateReason::PreviousFailure);
    }
    match change {
        Change::Changed => return Some(RegenerateReason::ContentChanged),
        Change::Unknown => return Some(RegenerateReason::ChangeUnknown),
        Change::Unchanged => {}
    }
    if let (Some(old), Some(new)) = (prior.last_fingerprint.as_deref(), fingerprint)
        && old != new
    {
        return Some(RegenerateReason::FingerprintMismatch);
    }
    if !artifact_present {
        return Some(RegenerateReason::ArtifactMissing);
    }
    None
}

/// How a job ended this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    FetchFailed,
    Skipped,
    Regenerated,
    GenerationFailed,
}

impl Disposition {
    fn from_state(state: JobState) -> Self {
        match state {
            JobState::Skip => Disposition::Skipped,
            JobState::Generated => Disposition::Regenerated,
            JobState::GenFailed => Disposition::GenerationFailed,
            _ => Disposition::FetchFailed,
        }
    }

    pub fn is_failure(self) -> bool {
        matches!(self, Disposition::FetchFailed | Disposition::GenerationFailed)
    }
}

/// Result of processing one job.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub url: String,
    pub slot: String,
    pub disposition: Disposition,
    pub reason: Option<RegenerateReason>,
    pub transitions: Vec<JobState>,
    /// Whether the updated record reached disk before the next job.
    pub persisted: bool,
    pub error: Option<String>,
}

/// Drives one job through fetch, the regeneration decision and generation,
/// then records the outcome.
pub struct UpdateEngine<O, G> {
    oracle: O,
    generator: G,
}

impl<O: FingerprintOracle, G: ArtifactGenerator> UpdateEngine<O, G> {
    pub fn new(oracle: O, generator: G) -> Self {
        Self { oracle, generator }
    }

    #[cfg(test)]
    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    #[cfg(test)]
    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// Process `job` and persist its record. Never fails: every per-job
    /// failure becomes part of the recorded outcome.
    pub async fn process(&self, job: &Job, store: &mut StateStore) -> JobReport {
        let span = info_span!("job", url = %job.url, slot = %job.slot);
        self.process_inner(job, store).instrument(span).await
    }

    async fn process_inner(&self, job: &Job, store: &mut StateStore) -> JobReport {
        let prior = store.get(&job.url).cloned();
        let mut record = prior.clone().unwrap_or_default();
        record.last_attempt_time = Utc::now();
        record.slot = Some(job.slot.clone());
        record.artifact_path = Some(job.artifact_path.clone());

        let mut trace = JobTrace::new();
        let mut reason = None;

        advance(&mut trace, Event::StartFetch);
        match self.oracle.sync(job).await {
            SyncOutcome::Failed(e) => {
                advance(&mut trace, Event::FetchFailed);
                warn!(error = %e, "fetch failed, will retry next run");
                // A fetch failure says nothing about the existing artifact.
                record.fetch_succeeded = false;
                record.last_error = Some(e.to_string());
            }
            SyncOutcome::Synced {
                fingerprint,
                change,
            } => {
                advance(&mut trace, Event::FetchSucceeded);
                record.fetch_succeeded = true;
                record.last_fingerprint = fingerprint.clone();

                advance(&mut trace, Event::Evaluate);
                let artifact_present = tokio::fs::try_exists(&job.artifact_path)
                    .await
                    .unwrap_or(false);
                reason = decide(
                    prior.as_ref(),
                    fingerprint.as_deref(),
                    change,
                    artifact_present,
                );

                match reason {
                    None => {
                        advance(&mut trace, Event::ArtifactCurrent);
                        info!("artifact is current, skipping generation");
                        record.last_error = None;
                    }
                    Some(why) => {
                        advance(&mut trace, Event::ArtifactRequired);
                        advance(&mut trace, Event::StartGeneration);
                        info!(reason = %why, "generating artifact");
                        match self.generate(job).await {
                            Ok(bytes) => {
                                advance(&mut trace, Event::GenerationSucceeded);
                                info!(bytes, "artifact generated");
                                record.artifact_succeeded = true;
                                record.last_error = None;
                            }
                            Err(e) => {
                                advance(&mut trace, Event::GenerationFailed);
                                warn!(error = %e, "artifact generation failed, will retry next run");
                                record.artifact_succeeded = false;
                                record.last_error = Some(e.to_string());
                            }
                        }
                    }
                }
            }
        }

        debug_assert!(trace.state().is_terminal());
        let error = record.last_error.clone();
        store.update(&job.url, record);
        let persisted = match store.persist() {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "could not persist crawl state, continuing in memory");
                false
            }
        };

        JobReport {
            url: job.url.clone(),
            slot: job.slot.clone(),
            disposition: Disposition::from_state(trace.state()),
            reason,
            transitions: trace.transitions(),
            persisted,
            error,
        }
    }

    async fn generate(&self, job: &Job) -> Result<u64, ArtifactError> {
        let info = self.generator.generate(job, &job.content_dir).await?;
        if !tokio::fs::try_exists(&job.artifact_path).await.unwrap_or(false) {
            return Err(ArtifactError::MissingOutput(job.artifact_path.clone()));
        }
        Ok(info.bytes)
    }
}

fn advance(trace: &mut JobTrace, event: Event) {
    if let Transition::Rejected { from, event } = trace.apply(event) {
        error!(%from, ?event, "invalid job transition ignored");
    }
}
