//! Status record persistence
//!
//! `<work_dir>/<runtime_id>/status.yaml` is rewritten at every lifecycle
//! transition. The write goes through a temporary file and a rename so an
//! observer never reads half a record.

use anyhow::{Context, Result};
use ferrule_core::domain::run::StatusRecord;
use std::path::{Path, PathBuf};

pub const STATUS_FILE_NAME: &str = "status.yaml";

pub fn status_path(job_dir: &Path) -> PathBuf {
    job_dir.join(STATUS_FILE_NAME)
}

pub fn write_status(job_dir: &Path, record: &StatusRecord) -> Result<()> {
    let yaml = serde_yaml::to_string(record).context("Failed to serialize status record")?;
    let tmp = job_dir.join(format!("{}.tmp", STATUS_FILE_NAME));
    std::fs::write(&tmp, yaml)
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, status_path(job_dir))
        .with_context(|| format!("Failed to replace status file in {}", job_dir.display()))?;
    Ok(())
}

pub fn read_status(job_dir: &Path) -> Result<StatusRecord> {
    let path = status_path(job_dir);
    let yaml = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_yaml::from_str(&yaml).with_context(|| format!("Failed to parse {}", path.display()))
}
