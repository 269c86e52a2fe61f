//! Producing the derived artifact ("gist") from a synchronized checkout.

pub mod command;
pub mod digest;

pub use command::CommandGenerator;
pub use digest::DigestGenerator;

use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::config::GeneratorConfig;
use crate::error::ArtifactError;
use crate::state_machine::Job;

/// What a successful generation produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactInfo {
    pub bytes: u64,
}

/// Generates a job's artifact at `job.artifact_path`.
///
/// Implementations never touch the state store; the engine records the
/// outcome. Timeouts surface as ordinary [`ArtifactError`]s.
pub trait ArtifactGenerator {
    async fn generate(&self, job: &Job, source: &Path) -> Result<ArtifactInfo, ArtifactError>;
}

/// The generator selected by configuration.
#[derive(Debug, Clone)]
pub enum Generator {
    Digest(DigestGenerator),
    Command(CommandGenerator),
}

impl Generator {
    pub fn from_config(config: &GeneratorConfig) -> Self {
        match config {
            GeneratorConfig::Digest {
                max_file_bytes,
                max_total_bytes,
            } => Generator::Digest(DigestGenerator::new(*max_file_bytes, *max_total_bytes)),
            GeneratorConfig::Command {
                program,
                args,
                timeout_secs,
            } => Generator::Command(CommandGenerator::new(
                program.clone(),
                args.clone(),
                *timeout_secs,
            )),
        }
    }
}

impl ArtifactGenerator for Generator {
    async fn generate(&self, job: &Job, source: &Path) -> Result<ArtifactInfo, ArtifactError> {
        match self {
            Generator::Digest(g) => g.generate(job, source).await,
            Generator::Command(g) => g.generate(job, source).await,
        }
    }
}

/// Write `contents` to `target` via a temp file in the same directory, so a
/// crash mid-write never leaves a partial artifact behind.
pub(crate) fn write_atomically(target: &Path, contents: &[u8]) -> Result<u64, ArtifactError> {
    let dir = target
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(target).map_err(|e| ArtifactError::Io(e.error))?;
    Ok(contents.len() as u64)
}
