//! Ferrule
//!
//! Runs jobs described in YAML, one after another, each through the executor
//! it names. Later jobs can reference the results of earlier ones with
//! `${job_id.path}` placeholders.
//!
//! Layout:
//! - logging: tracing setup, optional socket mirror
//! - config: runner settings from defaults, config file, environment, flags
//! - executor: the executor capability and its implementations
//! - driver: the lifecycle of a single job
//! - batch: ordered runs sharing results

mod artifacts;
mod batch;
mod cli;
mod config;
mod context;
mod driver;
mod executor;
mod logging;
mod notify;
mod sinks;
mod status;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};

use crate::batch::BatchRunner;
use crate::cli::{Cli, print_summary};
use crate::config::Config;
use crate::driver::JobDriver;
use crate::executor::{ExecutorRegistry, check_available};
use crate::notify::HttpNotifier;

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())
        .context("Failed to load configuration")?
        .with_overrides(cli.log_dir.clone(), cli.work_dir.clone())
        .absolutize()?;
    config.validate()?;
    info!(
        "Loaded configuration: runner_id={}, work_dir={}, log_dir={}",
        config.runner_id,
        config.work_dir.display(),
        config.log_dir.display()
    );

    let jobs = cli.command.load_jobs()?;
    info!("Loaded {} job(s)", jobs.len());

    let client = reqwest::Client::new();
    let registry = ExecutorRegistry::standard(client.clone());

    let capabilities = registry.capabilities();
    info!("Registered {} executors", capabilities.len());
    for cap in &capabilities {
        info!("  - {}", cap);
    }
    for binary in ["docker", "podman"] {
        if let Err(e) = check_available(binary) {
            warn!("{} jobs will fail: {:#}", binary, e);
        }
    }

    let driver = JobDriver::new(
        Arc::new(config),
        Arc::new(registry),
        Arc::new(HttpNotifier::new(client)),
    );
    let report = BatchRunner::new(&driver).run(jobs).await;
    print_summary(&report);

    if cli.fail_on_error && !report.all_succeeded() {
        std::process::exit(1);
    }
    Ok(())
}
