//! Error types for the Ferrule core

use std::path::PathBuf;
use thiserror::Error;

use crate::domain::run::JobStatus;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised by loading, storing, and lifecycle bookkeeping
#[derive(Debug, Error)]
pub enum CoreError {
    /// Job file could not be read
    #[error("Failed to read job file {path}: {source}")]
    ReadJobFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Job file is not valid YAML for a job (or job list)
    #[error("Failed to parse job document: {0}")]
    ParseJobFile(#[from] serde_yaml::Error),

    /// Two jobs in one batch declared the same identifier
    #[error("Duplicate job_id '{0}' in batch")]
    DuplicateJobId(String),

    /// Identifier cannot be used as a directory name
    #[error("Invalid job identifier '{0}'")]
    InvalidJobId(String),

    /// Result store I/O failure
    #[error("Result store I/O error for job {job_id}: {source}")]
    StoreIo {
        job_id: String,
        #[source]
        source: std::io::Error,
    },

    /// Result document exists but is not valid JSON
    #[error("Malformed result document for job {job_id}: {source}")]
    MalformedResult {
        job_id: String,
        #[source]
        source: serde_json::Error,
    },

    /// Status change not allowed by the lifecycle
    #[error("Illegal status transition from {from} to {to}")]
    IllegalTransition { from: JobStatus, to: JobStatus },
}
