//! Native plain-text digest of a checkout: a header, the directory
//! listing, then every text file inlined under a `FILE:` banner.

use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use super::{ArtifactGenerator, ArtifactInfo, write_atomically};
use crate::error::ArtifactError;
use crate::state_machine::Job;

const BANNER: &str = "================================================\n";
/// Bytes inspected for a NUL when deciding whether a file is binary.
const BINARY_SNIFF_LEN: usize = 8 * 1024;

#[derive(Debug, Clone)]
pub struct DigestGenerator {
    max_file_bytes: u64,
    max_total_bytes: u64,
}

impl DigestGenerator {
    pub fn new(max_file_bytes: u64, max_total_bytes: u64) -> Self {
        Self {
            max_file_bytes,
            max_total_bytes,
        }
    }

    /// Build the digest text for the checkout at `root`.
    pub fn render(&self, url: &str, root: &Path) -> Result<String, ArtifactError> {
        let root_label = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "repo".to_string());

        let mut listing = format!("{root_label}/\n");
        let mut files: Vec<PathBuf> = Vec::new();

        let walker = WalkDir::new(root)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.file_name() != ".git");
        for entry in walker {
            let entry = entry.map_err(|e| ArtifactError::Io(e.into()))?;
            let indent = "    ".repeat(entry.depth());
            let name = entry.file_name().to_string_lossy();
            if entry.file_type().is_dir() {
                listing.push_str(&format!("{indent}{name}/\n"));
            } else {
                listing.push_str(&format!("{indent}{name}\n"));
                if entry.file_type().is_file() {
                    files.push(entry.into_path());
                }
            }
        }

        let mut body = String::new();
        let mut inlined: u64 = 0;
        let mut truncated = false;
        for path in &files {
            let rel = path
                .strip_prefix(root)
                .unwrap_or(path)
                .to_string_lossy()
                .replace('\\', "/");
            body.push_str(BANNER);
            body.push_str(&format!("FILE: {rel}\n"));
            body.push_str(BANNER);

            let len = std::fs::metadata(path)?.len();
            if len > self.max_file_bytes {
                body.push_str(&format!("(omitted: {len} bytes exceeds per-file limit)\n\n"));
                continue;
            }

            let data = std::fs::read(path)?;
            if data[..data.len().min(BINARY_SNIFF_LEN)].contains(&0) {
                body.push_str("(binary file)\n\n");
                continue;
            }
            // Only inlined content counts toward the total.
            if truncated || inlined + len > self.max_total_bytes {
                truncated = true;
                body.push_str("(omitted: digest size limit reached)\n\n");
                continue;
            }
            body.push_str(&String::from_utf8_lossy(&data));
            if !data.ends_with(b"\n") {
                body.push('\n');
            }
            body.push('\n');
            inlined += len;
        }

        let mut digest = format!(
            "Repository: {url}\nFiles: {}\nInlined bytes: {inlined}{}\n\nDirectory structure:\n",
            files.len(),
            if truncated { " (truncated)" } else { "" },
        );
        digest.push_str(&listing);
        digest.push('\n');
        digest.push_str(&body);
        Ok(digest)
    }
}

impl ArtifactGenerator for DigestGenerator {
    async fn generate(&self, job: &Job, source: &Path) -> Result<ArtifactInfo, ArtifactError> {
        let generator = self.clone();
        let url = job.url.clone();
        let source = source.to_path_buf();
        let target = job.artifact_path.clone();

        let bytes = tokio::task::spawn_blocking(move || {
            let digest = generator.render(&url, &source)?;
            write_atomically(&target, digest.as_bytes())
        })
        .await
        .map_err(|e| ArtifactError::Aborted(e.to_string()))??;

        debug!(path = %job.artifact_path.display(), bytes, "digest written");
        Ok(ArtifactInfo { bytes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn sample_checkout() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join("README.md"), "# Sample\n").unwrap();
        fs::write(root.join("src/main.rs"), "fn main() {}").unwrap();
        fs::write(root.join(".git/config"), "[core]\n").unwrap();
        fs::write(root.join("logo.bin"), [0x89, b'P', 0, 1, 2]).unwrap();
        tmp
    }

    #[test]
    fn render_lists_and_inlines_text_files() {
        let checkout = sample_checkout();
        let digest = DigestGenerator::new(1024, 1024 * 1024)
            .render("https://github.com/o/sample", checkout.path())
            .unwrap();

        assert!(digest.starts_with("Repository: https://github.com/o/sample\nFiles: 3\n"));
        assert!(digest.contains("Directory structure:\n"));
        assert!(digest.contains("    src/\n        main.rs\n"));
        assert!(digest.contains("FILE: README.md\n"));
        assert!(digest.contains("# Sample\n"));
        assert!(digest.contains("FILE: src/main.rs\n"));
        assert!(digest.contains("fn main() {}\n"));
    }

    #[test]
    fn render_skips_git_metadata() {
        let checkout = sample_checkout();
        let digest = DigestGenerator::new(1024, 1024 * 1024)
            .render("u", checkout.path())
            .unwrap();
        assert!(!digest.contains(".git"));
        assert!(!digest.contains("[core]"));
    }

    #[test]
    fn render_does_not_inline_binary_or_oversized_files() {
        let checkout = sample_checkout();
        fs::write(checkout.path().join("big.txt"), "x".repeat(64)).unwrap();

        let digest = DigestGenerator::new(32, 1024 * 1024)
            .render("u", checkout.path())
            .unwrap();
        assert!(digest.contains("FILE: logo.bin\n"));
        assert!(digest.contains("(binary file)"));
        assert!(digest.contains("(omitted: 64 bytes exceeds per-file limit)"));
        assert!(!digest.contains(&"x".repeat(64)));
    }

    #[test]
    fn render_stops_inlining_at_total_limit() {
        let checkout = sample_checkout();
        // README.md (9 bytes) fits, src/main.rs (12 bytes) does not.
        let digest = DigestGenerator::new(1024, 16)
            .render("u", checkout.path())
            .unwrap();
        assert!(digest.contains("(truncated)"));
        assert!(digest.contains("# Sample"));
        assert!(!digest.contains("fn main()"));
        assert!(digest.contains("(omitted: digest size limit reached)"));
    }

    #[test]
    fn skipped_files_do_not_consume_the_total_limit() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a_big.bin"), "y".repeat(200)).unwrap();
        fs::write(tmp.path().join("b_logo.png"), [0u8, 1, 2, 3]).unwrap();
        fs::write(tmp.path().join("c_small.txt"), "hello\n").unwrap();

        let digest = DigestGenerator::new(50, 100)
            .render("u", tmp.path())
            .unwrap();
        assert!(digest.contains("(omitted: 200 bytes exceeds per-file limit)"));
        assert!(digest.contains("(binary file)"));
        assert!(digest.contains("hello\n"));
        assert!(!digest.contains("(truncated)"));
        assert!(digest.contains("Inlined bytes: 6\n"));
    }

    #[tokio::test]
    async fn generate_writes_artifact() {
        let checkout = sample_checkout();
        let data = TempDir::new().unwrap();
        let job = Job::new("https://github.com/o/sample", data.path()).unwrap();

        let info = DigestGenerator::new(1024, 1024 * 1024)
            .generate(&job, checkout.path())
            .await
            .unwrap();

        let written = fs::read_to_string(&job.artifact_path).unwrap();
        assert_eq!(info.bytes, written.len() as u64);
        assert!(written.contains("FILE: README.md"));
    }
}
