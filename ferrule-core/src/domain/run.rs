//! Job run state
//!
//! A `JobRun` is attached to a job while the driver executes it. Status only
//! moves forward: `pending -> running -> success | failed`, with a single
//! shortcut `pending -> failed` for jobs whose resources could not be
//! provisioned. Terminal states never change again.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::error::{CoreError, Result};

/// Exit code of a job whose executor has not returned yet
pub const EXIT_CODE_UNSET: i32 = -1;

/// Job lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Success,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Success => "success",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Failed)
    }

    fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Pending, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::Success)
                | (JobStatus::Running, JobStatus::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted status record, rewritten at every transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub job_id: String,
    pub status: JobStatus,
    pub exit_code: i32,
    pub log_file: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Runtime state of a single job execution
#[derive(Debug, Clone)]
pub struct JobRun {
    /// Engine-assigned identifier
    pub runtime_id: String,
    /// Job working directory (`<work_dir>/<runtime_id>`)
    pub work_dir: PathBuf,
    /// Log file, once provisioned
    pub log_file: Option<PathBuf>,
    status: JobStatus,
    exit_code: i32,
}

impl JobRun {
    /// Creates a pending run with an unset exit code
    pub fn new(runtime_id: impl Into<String>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            runtime_id: runtime_id.into(),
            work_dir: work_dir.into(),
            log_file: None,
            status: JobStatus::Pending,
            exit_code: EXIT_CODE_UNSET,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }

    /// `pending -> running`
    pub fn start(&mut self) -> Result<()> {
        self.transition(JobStatus::Running)
    }

    /// `running -> success | failed`, decided by the exit code
    pub fn finish(&mut self, exit_code: i32) -> Result<JobStatus> {
        let next = if exit_code == 0 {
            JobStatus::Success
        } else {
            JobStatus::Failed
        };
        if self.status != JobStatus::Running {
            return Err(CoreError::IllegalTransition {
                from: self.status,
                to: next,
            });
        }
        self.transition(next)?;
        self.exit_code = exit_code;
        Ok(next)
    }

    /// `pending -> failed`, for jobs that never got their resources
    pub fn abort(&mut self, exit_code: i32) -> Result<()> {
        if self.status != JobStatus::Pending {
            return Err(CoreError::IllegalTransition {
                from: self.status,
                to: JobStatus::Failed,
            });
        }
        self.transition(JobStatus::Failed)?;
        self.exit_code = exit_code;
        Ok(())
    }

    /// Snapshot of the current state for persistence
    pub fn status_record(&self) -> StatusRecord {
        StatusRecord {
            job_id: self.runtime_id.clone(),
            status: self.status,
            exit_code: self.exit_code,
            log_file: self
                .log_file
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default(),
            timestamp: chrono::Utc::now(),
        }
    }

    fn transition(&mut self, next: JobStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::IllegalTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}
