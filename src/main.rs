mod cli;
mod config;
mod engine;
mod error;
mod generate;
mod logging;
mod queue;
mod runner;
mod state_machine;
mod store;
mod sync;
mod ui;

#[cfg(test)]
mod testing;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::Ordering;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use cli::{Cli, Command};
use config::CrawlerConfig;
use engine::UpdateEngine;
use generate::Generator;
use queue::Queue;
use runner::Runner;
use state_machine::{Job, canonical_url};
use store::StateStore;
use sync::GitOracle;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = logging::init(cli.verbose) {
        eprintln!("{e:#}");
    }

    match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: Cli) -> Result<ExitCode> {
    let mut config = CrawlerConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Run { queue, data_dir } => {
            if let Some(queue) = queue {
                config.queue_file = queue;
            }
            override_data_dir(&mut config, data_dir);
            run(&config, cli.verbose).await
        }
        Command::Status { data_dir } => {
            override_data_dir(&mut config, data_dir);
            let (store, status) = StateStore::load(config.state_path());
            ui::print_load_status(&status);
            ui::print_status(&store);
            Ok(ExitCode::SUCCESS)
        }
        Command::Forget {
            urls,
            all,
            data_dir,
        } => {
            override_data_dir(&mut config, data_dir);
            forget(&config, &urls, all)
        }
    }
}

fn override_data_dir(config: &mut CrawlerConfig, data_dir: Option<PathBuf>) {
    if let Some(dir) = data_dir {
        config.data_dir = dir;
    }
}

async fn run(config: &CrawlerConfig, verbose: bool) -> Result<ExitCode> {
    let queue = Queue::load(&config.queue_file)
        .with_context(|| format!("cannot read queue {}", config.queue_file.display()))?;
    ui::print_rejected(&queue.rejected);
    if queue.duplicates > 0 {
        info!(duplicates = queue.duplicates, "collapsed duplicate queue entries");
    }

    let jobs = queue
        .urls
        .iter()
        .map(|url| Job::new(url, &config.data_dir))
        .collect::<Result<Vec<_>, _>>()?;

    std::fs::create_dir_all(&config.data_dir).with_context(|| {
        format!("cannot create data directory {}", config.data_dir.display())
    })?;
    let (mut store, status) = StateStore::load(config.state_path());
    ui::print_load_status(&status);

    let engine = UpdateEngine::new(GitOracle, Generator::from_config(&config.generator));
    let runner = Runner::new(engine);

    let stop = runner.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing current job (press Ctrl-C again to abort)");
            stop.store(true, Ordering::SeqCst);
        }
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });

    let mut progress = ui::RunProgress::new(verbose);
    let summary = runner.run(&jobs, &mut store, &mut progress).await;
    ui::print_summary(&summary);

    if summary.final_persist_ok {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn forget(config: &CrawlerConfig, urls: &[String], all: bool) -> Result<ExitCode> {
    let (mut store, status) = StateStore::load(config.state_path());
    ui::print_load_status(&status);

    if all {
        let removed = store.clear();
        println!("Forgot {removed} record(s)");
    } else {
        for raw in urls {
            // Accept queue spellings as well as canonical keys.
            let key = canonical_url(raw).unwrap_or_else(|_| raw.clone());
            if store.remove(&key).is_some() {
                println!("Forgot {key}");
            } else {
                println!("No record for {key}");
            }
        }
    }

    if store.is_dirty() {
        store
            .persist()
            .with_context(|| format!("cannot write {}", store.path().display()))?;
    }
    Ok(ExitCode::SUCCESS)
}
