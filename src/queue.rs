//! Reading the crawl queue: one repository URL per line, `#` comments and
//! blank lines ignored, duplicates collapsed onto their first occurrence.

use std::collections::HashSet;
use std::path::Path;

use tracing::warn;

use crate::error::CrawlError;
use crate::state_machine::canonical_url;

/// A line that could not be turned into a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedLine {
    pub line: usize,
    pub content: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Queue {
    /// Canonical URLs in first-seen order.
    pub urls: Vec<String>,
    pub rejected: Vec<RejectedLine>,
    pub duplicates: usize,
}

impl Queue {
    pub fn load(path: &Path) -> Result<Self, CrawlError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CrawlError::QueueNotFound(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Self::parse(&contents))
    }

    pub fn parse(contents: &str) -> Self {
        let mut queue = Queue::default();
        let mut seen = HashSet::new();

        for (idx, raw) in contents.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match canonical_url(line) {
                Ok(url) => {
                    if seen.insert(url.clone()) {
                        queue.urls.push(url);
                    } else {
                        queue.duplicates += 1;
                    }
                }
                Err(e) => {
                    warn!(line = idx + 1, content = line, error = %e, "skipping queue entry");
                    queue.rejected.push(RejectedLine {
                        line: idx + 1,
                        content: line.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        queue
    }
}
