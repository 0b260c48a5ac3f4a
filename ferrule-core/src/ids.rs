//! Job identifiers
//!
//! Runtime identifiers are 10-character mixed-case alphanumeric strings
//! (62^10, roughly 8.4e17 values). They name the working directory, log
//! file and result document of a job, so they also have to be safe as a
//! single path component.

use rand::Rng;
use std::collections::HashMap;

/// Length of an engine-assigned job identifier
pub const JOB_ID_LENGTH: usize = 10;

/// Generate a fresh runtime identifier
pub fn generate_job_id() -> String {
    rand::rng()
        .sample_iter(&rand::distr::Alphanumeric)
        .take(JOB_ID_LENGTH)
        .map(char::from)
        .collect()
}

/// Returns true if `id` can be used as a single directory name
pub fn is_valid_job_id(id: &str) -> bool {
    !id.is_empty()
        && id != "."
        && id != ".."
        && !id.contains(['/', '\\', '\0'])
}

/// Batch-scoped table from declared job identifiers to runtime identifiers
#[derive(Debug, Clone, Default)]
pub struct IdMapping {
    entries: HashMap<String, String>,
}

impl IdMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, declared: impl Into<String>, runtime: impl Into<String>) {
        self.entries.insert(declared.into(), runtime.into());
    }

    /// Runtime identifier for a declared one, if the job ran in this batch
    pub fn runtime_id(&self, declared: &str) -> Option<&str> {
        self.entries.get(declared).map(String::as_str)
    }

    /// Runtime identifier for `id`, or `id` itself when it is not mapped
    ///
    /// Unmapped identifiers are assumed to already be runtime identifiers,
    /// which is how jobs from earlier invocations are referenced.
    pub fn translate<'a>(&'a self, id: &'a str) -> &'a str {
        self.runtime_id(id).unwrap_or(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
