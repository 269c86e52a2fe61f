//! tracing subscriber setup. Logs go to stderr so stdout stays readable.

use anyhow::{Result, anyhow};
use tracing_subscriber::{EnvFilter, fmt};

/// Overrides the default level, e.g. `GISTCRAWL_LOG=gistcrawl=debug`.
pub const LOG_ENV: &str = "GISTCRAWL_LOG";

fn filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| default_filter(verbose))
}

fn default_filter(verbose: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new("gistcrawl=info,warn")
    } else {
        EnvFilter::new("warn")
    }
}

pub fn init(verbose: bool) -> Result<()> {
    fmt()
        .with_env_filter(filter(verbose))
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        .try_init()
        .map_err(|e| anyhow!("failed to initialise logging: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_follows_verbosity() {
        assert_eq!(default_filter(false).to_string(), "warn");
        assert!(default_filter(true).to_string().contains("gistcrawl=info"));
    }
}
