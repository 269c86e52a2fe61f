use std::path::PathBuf;

use thiserror::Error;

/// Run-level errors. These stop a command before any job is processed.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Queue file not found: {}", .0.display())]
    QueueNotFound(PathBuf),

    #[error("Invalid repository URL `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CrawlError {
    pub fn invalid_url(url: &str, reason: impl Into<String>) -> Self {
        CrawlError::InvalidUrl {
            url: url.to_string(),
            reason: reason.into(),
        }
    }
}

/// The local copy could not be brought up to date. The job is retried on the next run.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("clone of {url} failed: {source}")]
    Clone {
        url: String,
        #[source]
        source: git2::Error,
    },

    #[error("fetch from origin failed: {0}")]
    Fetch(#[source] git2::Error),

    #[error("could not prepare {}: {source}", path.display())]
    Prepare {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("sync task aborted: {0}")]
    Aborted(String),
}

/// The content is fine, only the derived artifact is stale.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("IO error while generating artifact: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{program}` exited with {status}: {stderr}")]
    CommandFailed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("generation timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("generator reported success but {} does not exist", .0.display())]
    MissingOutput(PathBuf),

    #[error("generation task aborted: {0}")]
    Aborted(String),
}

/// Problems with the persisted state file.
#[derive(Debug, Error)]
pub enum StateError {
    /// Unreadable state. Treated as an empty snapshot, never fatal.
    #[error("state file {} is unreadable: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    /// The snapshot could not be written. The run continues in memory.
    #[error("failed to persist state to {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
