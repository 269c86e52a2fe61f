//! Artifact generation delegated to an external program, e.g. a digest tool
//! installed on the machine. Arguments may use `{url}`, `{source}` and
//! `{output}` placeholders.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info};

use super::{ArtifactGenerator, ArtifactInfo};
use crate::error::ArtifactError;
use crate::state_machine::Job;

/// Longest stderr excerpt kept in an error.
const STDERR_EXCERPT: usize = 2000;

#[derive(Debug, Clone)]
pub struct CommandGenerator {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandGenerator {
    pub fn new(program: String, args: Vec<String>, timeout_secs: u64) -> Self {
        Self {
            program,
            args,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    fn expand_args(&self, url: &str, source: &Path, output: &Path) -> Vec<String> {
        let source = source.to_string_lossy();
        let output = output.to_string_lossy();
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{url}", url)
                    .replace("{source}", &source)
                    .replace("{output}", &output)
            })
            .collect()
    }
}

impl ArtifactGenerator for CommandGenerator {
    async fn generate(&self, job: &Job, source: &Path) -> Result<ArtifactInfo, ArtifactError> {
        // The program writes next to the artifact, then we rename it into place.
        let partial = job.artifact_path.with_extension("partial");
        if let Some(parent) = partial.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // A leftover from a killed run must not pass for fresh output.
        remove_if_present(&partial).await?;
        let args = self.expand_args(&job.url, source, &partial);
        info!(program = %self.program, ?args, "running artifact command");

        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ArtifactError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(e.into());
            }
            Err(_) => {
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(ArtifactError::Timeout {
                    secs: self.timeout.as_secs(),
                });
            }
        };

        if !output.status.success() {
            let _ = tokio::fs::remove_file(&partial).await;
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr: String = stderr.trim().chars().take(STDERR_EXCERPT).collect();
            return Err(ArtifactError::CommandFailed {
                program: self.program.clone(),
                status: output.status.to_string(),
                stderr,
            });
        }

        if !tokio::fs::try_exists(&partial).await.unwrap_or(false) {
            return Err(ArtifactError::MissingOutput(partial));
        }
        tokio::fs::rename(&partial, &job.artifact_path).await?;
        let bytes = tokio::fs::metadata(&job.artifact_path).await?.len();
        debug!(path = %job.artifact_path.display(), bytes, "artifact command finished");
        Ok(ArtifactInfo { bytes })
    }
}

async fn remove_if_present(path: &Path) -> Result<(), ArtifactError> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn job_in(data: &TempDir) -> Job {
        Job::new("https://github.com/o/r", data.path()).unwrap()
    }

    #[test]
    fn placeholders_are_expanded() {
        let generator = CommandGenerator::new(
            "tool".into(),
            vec!["{source}".into(), "-o".into(), "{output}".into(), "--url={url}".into()],
            5,
        );
        let args = generator.expand_args("https://x/y/z", Path::new("/src"), Path::new("/out.txt"));
        assert_eq!(args, vec!["/src", "-o", "/out.txt", "--url=https://x/y/z"]);
    }

    #[tokio::test]
    async fn successful_command_moves_output_into_place() {
        let data = TempDir::new().unwrap();
        let job = job_in(&data);
        let generator = CommandGenerator::new(
            "sh".into(),
            vec!["-c".into(), "printf digest > \"$0\"".into(), "{output}".into()],
            10,
        );

        let info = generator.generate(&job, data.path()).await.unwrap();
        assert_eq!(info.bytes, 6);
        assert_eq!(std::fs::read_to_string(&job.artifact_path).unwrap(), "digest");
        assert!(!job.artifact_path.with_extension("partial").exists());
    }

    #[tokio::test]
    async fn failing_command_reports_stderr() {
        let data = TempDir::new().unwrap();
        let job = job_in(&data);
        let generator = CommandGenerator::new(
            "sh".into(),
            vec!["-c".into(), "echo boom >&2; exit 3".into()],
            10,
        );

        match generator.generate(&job, data.path()).await {
            Err(ArtifactError::CommandFailed { stderr, .. }) => assert_eq!(stderr, "boom"),
            other => panic!("expected command failure, got {other:?}"),
        }
        assert!(!job.artifact_path.exists());
    }

    #[tokio::test]
    async fn command_without_output_is_a_failure() {
        let data = TempDir::new().unwrap();
        let job = job_in(&data);
        let generator = CommandGenerator::new("true".into(), vec![], 10);

        let err = generator.generate(&job, data.path()).await.unwrap_err();
        assert!(matches!(err, ArtifactError::MissingOutput(_)));
    }

    #[tokio::test]
    async fn stale_partial_output_is_not_promoted() {
        let data = TempDir::new().unwrap();
        let job = job_in(&data);
        let partial = job.artifact_path.with_extension("partial");
        std::fs::create_dir_all(partial.parent().unwrap()).unwrap();
        std::fs::write(&partial, "left by a killed run").unwrap();
        let generator = CommandGenerator::new("true".into(), vec![], 10);

        let err = generator.generate(&job, data.path()).await.unwrap_err();
        assert!(matches!(err, ArtifactError::MissingOutput(_)));
        assert!(!job.artifact_path.exists());
        assert!(!partial.exists());
    }

    #[tokio::test]
    async fn slow_command_times_out() {
        let data = TempDir::new().unwrap();
        let job = job_in(&data);
        let generator = CommandGenerator::new("sleep".into(), vec!["5".into()], 0);

        let err = generator.generate(&job, data.path()).await.unwrap_err();
        assert!(matches!(err, ArtifactError::Timeout { secs: 0 }));
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let data = TempDir::new().unwrap();
        let job = job_in(&data);
        let generator = CommandGenerator::new("definitely-not-a-real-program-xyz".into(), vec![], 5);

        let err = generator.generate(&job, data.path()).await.unwrap_err();
        assert!(matches!(err, ArtifactError::Spawn { .. }));
    }
}
