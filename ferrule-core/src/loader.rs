//! Job document loading
//!
//! A job document is either a single job mapping (`run`) or a sequence of
//! them (`run-multi`). Loading assigns every job a fresh runtime identifier;
//! jobs without a declared `job_id` use that runtime identifier as their
//! declared one too.

use std::collections::HashSet;
use std::path::Path;

use crate::domain::job::{JobDefinition, LoadedJob};
use crate::error::{CoreError, Result};
use crate::ids::{generate_job_id, is_valid_job_id};

/// Parse a single job document
pub fn parse_job(source: &str) -> Result<LoadedJob> {
    let definition: JobDefinition = serde_yaml::from_str(source)?;
    let mut jobs = assign_ids(vec![definition])?;
    Ok(jobs.remove(0))
}

/// Parse a document holding an ordered list of jobs
pub fn parse_jobs(source: &str) -> Result<Vec<LoadedJob>> {
    if source.trim().is_empty() {
        return Ok(Vec::new());
    }
    let definitions: Option<Vec<JobDefinition>> = serde_yaml::from_str(source)?;
    assign_ids(definitions.unwrap_or_default())
}

/// Load a single job from a YAML file
pub fn load_job_file(path: &Path) -> Result<LoadedJob> {
    parse_job(&read(path)?)
}

/// Load an ordered job list from a YAML file
pub fn load_jobs_file(path: &Path) -> Result<Vec<LoadedJob>> {
    parse_jobs(&read(path)?)
}

/// Assign runtime identifiers, unique within the batch
pub fn assign_ids(definitions: Vec<JobDefinition>) -> Result<Vec<LoadedJob>> {
    let mut declared_seen = HashSet::new();
    let mut runtime_seen = HashSet::new();
    let mut jobs = Vec::with_capacity(definitions.len());

    for definition in definitions {
        let runtime_id = loop {
            let candidate = generate_job_id();
            if runtime_seen.insert(candidate.clone()) {
                break candidate;
            }
        };

        let declared_id = match definition.declared_id() {
            Some(id) if !is_valid_job_id(id) => {
                return Err(CoreError::InvalidJobId(id.to_string()));
            }
            Some(id) => id.to_string(),
            None => runtime_id.clone(),
        };

        if !declared_seen.insert(declared_id.clone()) {
            return Err(CoreError::DuplicateJobId(declared_id));
        }

        jobs.push(LoadedJob {
            declared_id,
            runtime_id,
            definition,
        });
    }

    Ok(jobs)
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| CoreError::ReadJobFile {
        path: path.to_path_buf(),
        source,
    })
}
