//! Sequential run over the queue. Each job is processed and persisted
//! before the next one starts, so stopping between jobs loses nothing.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::engine::{Disposition, JobReport, UpdateEngine};
use crate::generate::ArtifactGenerator;
use crate::state_machine::Job;
use crate::store::StateStore;
use crate::sync::FingerprintOracle;

/// Aggregate outcome of one run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub total: usize,
    pub fetched: usize,
    pub skipped: usize,
    pub regenerated: usize,
    pub fetch_failed: usize,
    pub generation_failed: usize,
    /// Jobs whose record could not be written right after processing.
    pub persist_failures: usize,
    /// Whether the state on disk matches memory at the end of the run.
    pub final_persist_ok: bool,
    pub interrupted: bool,
    pub reports: Vec<JobReport>,
}

impl RunSummary {
    fn new(total: usize) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            total,
            fetched: 0,
            skipped: 0,
            regenerated: 0,
            fetch_failed: 0,
            generation_failed: 0,
            persist_failures: 0,
            final_persist_ok: true,
            interrupted: false,
            reports: Vec::new(),
        }
    }

    pub fn processed(&self) -> usize {
        self.reports.len()
    }

    pub fn failed(&self) -> usize {
        self.fetch_failed + self.generation_failed
    }

    fn record(&mut self, report: JobReport) {
        match report.disposition {
            Disposition::FetchFailed => self.fetch_failed += 1,
            Disposition::Skipped => {
                self.fetched += 1;
                self.skipped += 1;
            }
            Disposition::Regenerated => {
                self.fetched += 1;
                self.regenerated += 1;
            }
            Disposition::GenerationFailed => {
                self.fetched += 1;
                self.generation_failed += 1;
            }
        }
        if !report.persisted {
            self.persist_failures += 1;
        }
        self.reports.push(report);
    }
}

/// Callbacks for terminal progress. The runner itself stays silent apart
/// from tracing.
pub trait RunObserver {
    fn job_started(&mut self, _index: usize, _total: usize, _job: &Job) {}
    fn job_finished(&mut self, _report: &JobReport) {}
}

pub struct Runner<O, G> {
    engine: UpdateEngine<O, G>,
    stop: Arc<AtomicBool>,
}

impl<O: FingerprintOracle, G: ArtifactGenerator> Runner<O, G> {
    pub fn new(engine: UpdateEngine<O, G>) -> Self {
        Self {
            engine,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag checked between jobs; setting it ends the run after the current job.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    #[cfg(test)]
    pub fn engine(&self) -> &UpdateEngine<O, G> {
        &self.engine
    }

    pub async fn run(
        &self,
        jobs: &[Job],
        store: &mut StateStore,
        observer: &mut impl RunObserver,
    ) -> RunSummary {
        let mut summary = RunSummary::new(jobs.len());
        info!(run_id = %summary.run_id, jobs = jobs.len(), "starting crawl");

        for (index, job) in jobs.iter().enumerate() {
            if self.stop.load(Ordering::SeqCst) {
                warn!(processed = index, "run interrupted, remaining jobs left for next run");
                summary.interrupted = true;
                break;
            }
            observer.job_started(index, jobs.len(), job);
            let report = self.engine.process(job, store).await;
            debug!(
                url = %report.url,
                slot = %report.slot,
                transitions = ?report.transitions,
                "job finished"
            );
            observer.job_finished(&report);
            summary.record(report);
        }

        if summary.persist_failures > 0 || store.is_dirty() {
            match store.persist() {
                Ok(()) => info!("crawl state persisted on final attempt"),
                Err(e) => {
                    error!(error = %e, "final persist failed, this run's updates are lost");
                    summary.final_persist_ok = false;
                }
            }
        }

        info!(
            run_id = %summary.run_id,
            processed = summary.processed(),
            skipped = summary.skipped,
            regenerated = summary.regenerated,
            failed = summary.failed(),
            "crawl finished"
        );
        summary
    }
}
