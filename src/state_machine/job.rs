use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

use crate::error::CrawlError;

/// Hex characters of the URL hash appended to every slot name.
const SLOT_HASH_LEN: usize = 16;

/// A single repository in the crawl queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Canonical source URL, also the key in the state file.
    pub url: String,
    /// Filesystem-safe directory name under the data directory.
    pub slot: String,
    pub repo_name: String,
    /// Where the synchronized checkout lives.
    pub content_dir: PathBuf,
    /// Where the generated digest is written.
    pub artifact_path: PathBuf,
}

impl Job {
    pub fn new(raw_url: &str, data_dir: &Path) -> Result<Self, CrawlError> {
        let url = canonical_url(raw_url)?;
        let repo_name = repo_name(&url);
        let slot = slot_name(&url);
        let slot_dir = data_dir.join(&slot);
        Ok(Self {
            content_dir: slot_dir.join("code"),
            artifact_path: slot_dir.join("gist").join(format!("{repo_name}_gist.txt")),
            url,
            slot,
            repo_name,
        })
    }
}

/// Normalize a repository URL into the key used for state and slot naming.
///
/// Accepts full URLs (`https`, `http`, `ssh`, `git`, `file`), scheme-less
/// `host/owner/repo` and scp-like `git@host:owner/repo`. Scheme and host are
/// lowercased, query and fragment dropped, trailing `/` and `.git` stripped.
pub fn canonical_url(raw: &str) -> Result<String, CrawlError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CrawlError::invalid_url(raw, "empty URL"));
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else if let Some((user_host, path)) = scp_like(trimmed) {
        format!("ssh://{user_host}/{}", path.trim_start_matches('/'))
    } else {
        format!("https://{trimmed}")
    };

    let mut url =
        Url::parse(&candidate).map_err(|e| CrawlError::invalid_url(raw, e.to_string()))?;

    let scheme = url.scheme().to_string();
    if !matches!(scheme.as_str(), "https" | "http" | "ssh" | "git" | "file") {
        return Err(CrawlError::invalid_url(
            raw,
            format!("unsupported scheme `{scheme}`"),
        ));
    }

    url.set_query(None);
    url.set_fragment(None);

    let mut path = url.path().trim_end_matches('/');
    while let Some(stripped) = path.strip_suffix(".git") {
        path = stripped.trim_end_matches('/');
    }
    let segments = path.split('/').filter(|s| !s.is_empty()).count();
    let required = if scheme == "file" { 1 } else { 2 };
    if segments < required {
        return Err(CrawlError::invalid_url(
            raw,
            "URL must include both owner and repository",
        ));
    }
    let path = path.to_string();
    url.set_path(&path);

    Ok(url.to_string())
}

fn scp_like(input: &str) -> Option<(&str, &str)> {
    if !input.contains('@') {
        return None;
    }
    let (user_host, path) = input.split_once(':')?;
    if user_host.contains('/') || path.is_empty() {
        return None;
    }
    Some((user_host, path))
}

fn path_segments(canonical: &str) -> Vec<String> {
    Url::parse(canonical)
        .ok()
        .map(|u| {
            u.path()
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect::<String>()
        .trim_matches('.')
        .to_string()
}

fn repo_name(canonical: &str) -> String {
    let name = path_segments(canonical)
        .last()
        .map(|s| sanitize(s))
        .unwrap_or_default();
    if name.is_empty() { "repo".to_string() } else { name }
}

/// Derive the on-disk slot for a canonical URL: `<owner>_<repo>-<hash>`.
///
/// The readable prefix may collide after sanitizing; the SHA-256 suffix of
/// the full canonical URL keeps distinct URLs in distinct slots.
pub fn slot_name(canonical: &str) -> String {
    let segments = path_segments(canonical);
    let tail: Vec<String> = segments
        .iter()
        .rev()
        .take(2)
        .rev()
        .map(|s| sanitize(s))
        .filter(|s| !s.is_empty())
        .collect();
    let prefix = if tail.is_empty() {
        "repo".to_string()
    } else {
        tail.join("_")
    };

    let digest = hex::encode(Sha256::digest(canonical.as_bytes()));
    format!("{prefix}-{}", &digest[..SLOT_HASH_LEN])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_url_normalizes_common_forms() {
        let expected = "https://github.com/rust-lang/cargo";
        for raw in [
            "https://github.com/rust-lang/cargo",
            "  https://github.com/rust-lang/cargo/  ",
            "https://GitHub.com/rust-lang/cargo.git",
            "github.com/rust-lang/cargo",
            "https://github.com/rust-lang/cargo?tab=readme#top",
        ] {
            assert_eq!(canonical_url(raw).unwrap(), expected, "input: {raw}");
        }
    }

    #[test]
    fn canonical_url_accepts_scp_like_syntax() {
        assert_eq!(
            canonical_url("git@github.com:rust-lang/cargo.git").unwrap(),
            "ssh://git@github.com/rust-lang/cargo"
        );
    }

    #[test]
    fn canonical_url_accepts_file_urls() {
        assert_eq!(
            canonical_url("file:///srv/git/tool.git").unwrap(),
            "file:///srv/git/tool"
        );
    }

    #[test]
    fn canonical_url_is_idempotent() {
        for raw in [
            "https://github.com/o/r.git.git",
            "https://github.com/o/r.git/.git/",
            "git@github.com:o/r.git.git",
            "github.com/o/r/",
        ] {
            let once = canonical_url(raw).unwrap();
            assert_eq!(canonical_url(&once).unwrap(), once, "input: {raw}");
        }
        assert_eq!(
            canonical_url("https://github.com/o/r.git.git").unwrap(),
            "https://github.com/o/r"
        );
    }

    #[test]
    fn canonical_url_rejects_bad_input() {
        assert!(canonical_url("").is_err());
        assert!(canonical_url("https://github.com/only-owner").is_err());
        assert!(canonical_url("ftp://example.com/a/b").is_err());
    }

    #[test]
    fn slot_name_is_deterministic_and_readable() {
        let url = "https://github.com/rust-lang/cargo";
        let slot = slot_name(url);
        assert_eq!(slot, slot_name(url));
        assert!(slot.starts_with("rust-lang_cargo-"));
        assert_eq!(slot.len(), "rust-lang_cargo-".len() + SLOT_HASH_LEN);
    }

    #[test]
    fn slot_name_separates_urls_with_same_readable_prefix() {
        let a = slot_name("https://github.com/owner/repo");
        let b = slot_name("https://gitlab.com/owner/repo");
        let c = slot_name("https://github.com/owner/re%20po");
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("owner_repo-"));
        assert!(b.starts_with("owner_repo-"));
    }

    #[test]
    fn slot_name_is_filesystem_safe() {
        let slot = slot_name("https://example.com/we ird/na:me");
        assert!(
            slot.chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        );
    }

    #[test]
    fn job_paths_live_under_slot() {
        let data = Path::new("/var/crawl");
        let job = Job::new("https://github.com/tokio-rs/tokio", data).unwrap();
        assert_eq!(job.url, "https://github.com/tokio-rs/tokio");
        assert_eq!(job.repo_name, "tokio");
        assert_eq!(job.content_dir, data.join(&job.slot).join("code"));
        assert_eq!(
            job.artifact_path,
            data.join(&job.slot).join("gist").join("tokio_gist.txt")
        );
    }
}
