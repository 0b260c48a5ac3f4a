//! Execution context
//!
//! Everything an executor needs to run one job: its parameters (still
//! unresolved), its log sink, its directories, and the resolution context
//! for placeholders. Executors resolve the fields they read themselves.

use ferrule_core::domain::log::LogSink;
use ferrule_core::params;
use ferrule_core::placeholder::{self, ResolveContext};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::artifacts::SANDBOX_DIR;
use crate::config::Config;

/// Per-job view handed to an executor
pub struct ExecutionContext<'a> {
    /// Runtime identifier of the job
    pub job_id: &'a str,
    /// Parameter bag
    pub product: &'a Map<String, Value>,
    /// Declared variables
    pub variables: &'a BTreeMap<String, String>,
    /// Job log
    pub log: Arc<dyn LogSink>,
    /// `<work_dir>/<job_id>`
    pub job_dir: &'a Path,
    pub resolve: ResolveContext<'a>,
    pub config: &'a Config,
}

impl ExecutionContext<'_> {
    /// Resolve placeholders in `text`
    pub fn resolve(&self, text: &str) -> String {
        placeholder::resolve(text, &self.resolve)
    }

    /// Resolve every string inside `value`, keeping its shape
    pub fn resolve_value(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => Value::String(self.resolve(s)),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.resolve_value(v)).collect()),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.resolve_value(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    /// Scalar parameter, resolved; blank values count as absent
    pub fn param(&self, key: &str) -> Option<String> {
        params::string(self.product, key)
            .map(|raw| self.resolve(raw.trim()))
            .filter(|v| !v.trim().is_empty())
    }

    /// Declared variables with their values resolved
    pub fn resolved_variables(&self) -> BTreeMap<String, String> {
        self.variables
            .iter()
            .map(|(k, v)| (k.clone(), self.resolve(v)))
            .collect()
    }

    /// Whether the `TTY` variable asks for a terminal
    pub fn wants_tty(&self) -> bool {
        self.variables
            .get("TTY")
            .is_some_and(|v| v == "true" || v == "1")
    }

    /// Directory the job's processes work in; removed after the job
    pub fn sandbox_dir(&self) -> PathBuf {
        self.job_dir.join(SANDBOX_DIR)
    }

    /// Where a job process should write its result document
    pub fn result_file(&self) -> PathBuf {
        self.resolve.store.result_path(self.job_id)
    }

    /// Standard environment exported to every job process
    ///
    /// `result_file` is the path as seen by the process, which differs from
    /// the host path inside a container.
    pub fn runner_env(&self, result_file: &str) -> Vec<(String, String)> {
        vec![
            ("JOB_ID".to_string(), self.job_id.to_string()),
            ("RUNNER_ID".to_string(), self.config.runner_id.clone()),
            ("RUNNER_HOSTNAME".to_string(), self.config.hostname.clone()),
            (
                "RUNNER_WORKDIR".to_string(),
                self.config.work_dir.to_string_lossy().into_owned(),
            ),
            (
                "RUNNER_LOG_DIR".to_string(),
                self.config.log_dir.to_string_lossy().into_owned(),
            ),
            ("JOB_RESULT_FILE".to_string(), result_file.to_string()),
        ]
    }

    /// Environment for a process running on this host
    pub fn host_env(&self) -> Vec<(String, String)> {
        let mut env = self.runner_env(&self.result_file().to_string_lossy());
        env.push((
            "JOB_WORKDIR".to_string(),
            self.sandbox_dir().to_string_lossy().into_owned(),
        ));
        env.extend(self.resolved_variables());
        env
    }

    /// Store a result document produced by the executor itself
    pub fn store_result(&self, document: &Value) {
        match self.resolve.store.write(self.job_id, document) {
            Ok(()) => self.log.debug("Result document stored"),
            Err(e) => self.log.error(&format!("Failed to store result document: {}", e)),
        }
    }

    /// Validate a result file written by a job process and store it
    ///
    /// A missing file is fine. A file that is not JSON is logged and
    /// removed, so it never shadows an older valid document.
    pub fn collect_result_file(&self, path: &Path) {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
            Err(e) => {
                self.log
                    .error(&format!("Failed to read result file {}: {}", path.display(), e));
                return;
            }
        };

        match serde_json::from_slice::<Value>(&bytes) {
            Ok(document) => {
                if path != self.result_file() {
                    self.remove_result_file(path);
                }
                self.store_result(&document);
            }
            Err(e) => {
                self.log
                    .warning(&format!("Ignoring result file {}: invalid JSON ({})", path.display(), e));
                self.remove_result_file(path);
            }
        }
    }

    fn remove_result_file(&self, path: &Path) {
        if let Err(e) = std::fs::remove_file(path) {
            self.log.warning(&format!(
                "Failed to remove result file {}: {}",
                path.display(),
                e
            ));
        }
    }
}
