//! Command line interface

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use ferrule_core::domain::job::LoadedJob;
use ferrule_core::domain::run::JobStatus;
use ferrule_core::loader;
use std::path::PathBuf;

use crate::batch::BatchReport;
use crate::driver::JobOutcome;

#[derive(Parser, Debug)]
#[command(name = "ferrule")]
#[command(about = "Runs YAML-defined jobs through pluggable executors", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to ./config.yaml when present)
    #[arg(short, long, global = true, env = "FERRULE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory for job log files
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    /// Directory for job working directories and results
    #[arg(long = "workdir", global = true)]
    pub work_dir: Option<PathBuf>,

    /// Exit with status 1 if any job failed
    #[arg(long, global = true)]
    pub fail_on_error: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Run a single job
    Run {
        /// YAML file holding one job
        file: PathBuf,
    },
    /// Run an ordered list of jobs, sharing results between them
    RunMulti {
        /// YAML file holding a list of jobs
        file: PathBuf,
    },
}

impl Commands {
    /// Load the jobs this command runs
    pub fn load_jobs(&self) -> Result<Vec<LoadedJob>> {
        match self {
            Commands::Run { file } => {
                let job = loader::load_job_file(file)
                    .with_context(|| format!("Failed to load job from {}", file.display()))?;
                Ok(vec![job])
            }
            Commands::RunMulti { file } => loader::load_jobs_file(file)
                .with_context(|| format!("Failed to load jobs from {}", file.display())),
        }
    }
}

/// Print one line block per job, then the totals
pub fn print_summary(report: &BatchReport) {
    println!();
    println!("{}", "Job Summary:".bold());
    for outcome in &report.outcomes {
        print_outcome(outcome);
    }

    let failed = report.failed_count();
    let total = format!("{} job(s), {} failed", report.outcomes.len(), failed);
    if failed == 0 {
        println!("{}", total.green());
    } else {
        println!("{}", total.red());
    }
}

fn print_outcome(outcome: &JobOutcome) {
    println!(
        "  {} {} {}",
        "▸".cyan(),
        outcome.declared_id.bold(),
        format!("({})", outcome.runtime_id).dimmed()
    );
    println!("    Status:    {}", colorize_status(outcome.status));
    println!("    Exit code: {}", outcome.exit_code);
    if let Some(log_file) = &outcome.log_file {
        println!("    Log:       {}", log_file.display().to_string().dimmed());
    }
    if !outcome.artifacts.is_empty() {
        println!("    Artifacts: {}", outcome.artifacts.len().to_string().yellow());
    }
}

fn colorize_status(status: JobStatus) -> colored::ColoredString {
    let text = status.as_str();
    match status {
        JobStatus::Pending => text.yellow(),
        JobStatus::Running => text.cyan(),
        JobStatus::Success => text.green(),
        JobStatus::Failed => text.red(),
    }
}
