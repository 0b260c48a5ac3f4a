//! Concrete LogSink implementation for the runner
//!
//! Each job writes its log to `<log_dir>/<runtime_id>.log`. Lines are also
//! forwarded to `tracing` so the process log shows job output tagged with
//! the job identifier.

use ferrule_core::domain::log::{LogLevel, LogSink};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, error, info, warn};

/// File-backed log sink for a single job
pub struct FileLogSink {
    job_id: String,
    path: PathBuf,
    file: Mutex<File>,
}

impl FileLogSink {
    /// Creates (or truncates) the log file at `path`
    pub fn create(job_id: impl Into<String>, path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let file = File::create(&path)?;
        Ok(Self {
            job_id: job_id.into(),
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogSink for FileLogSink {
    fn write(&self, level: LogLevel, message: &str) {
        let line = format!("{} {} {}\n", chrono::Utc::now().to_rfc3339(), level, message);
        match self.file.lock() {
            Ok(mut file) => {
                if let Err(e) = file.write_all(line.as_bytes()) {
                    warn!("Failed to write log file {}: {}", self.path.display(), e);
                }
            }
            Err(_) => warn!("Log file {} is poisoned", self.path.display()),
        }

        match level {
            LogLevel::Debug => debug!(job_id = %self.job_id, "{}", message),
            LogLevel::Info => info!(job_id = %self.job_id, "{}", message),
            LogLevel::Warning => warn!(job_id = %self.job_id, "{}", message),
            LogLevel::Error => error!(job_id = %self.job_id, "{}", message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_are_appended_with_level() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.log");
        let sink = FileLogSink::create("job", &path).unwrap();

        sink.info("starting");
        sink.error("boom");

        let content = std::fs::read_to_string(sink.path()).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(" INFO starting"));
        assert!(lines[1].ends_with(" ERROR boom"));
    }

    #[test]
    fn test_create_fails_for_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FileLogSink::create("job", dir.path().join("nope/job.log")).is_err());
    }
}
