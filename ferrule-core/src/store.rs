//! Result store
//!
//! Executors may leave a structured result document per job. Two layers hold
//! them:
//! - `ResultStore`: one `result.json` per runtime identifier under the
//!   working root. Survives the process, so later invocations sharing the
//!   same root can read it.
//! - `BatchResults`: the in-memory map for the current batch, keyed by the
//!   declared identifier.
//!
//! There is a single writer per job id; writes go through a temporary file
//! and a rename so readers never observe a partial document.

use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{CoreError, Result};
use crate::ids::is_valid_job_id;

/// File name of the on-disk result document inside a job directory
pub const RESULT_FILE_NAME: &str = "result.json";

/// On-disk result documents rooted at the working directory
#[derive(Debug, Clone)]
pub struct ResultStore {
    root: PathBuf,
}

impl ResultStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Working root the store writes under
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Canonical location of the result document for `job_id`
    pub fn result_path(&self, job_id: &str) -> PathBuf {
        self.root.join(job_id).join(RESULT_FILE_NAME)
    }

    /// Serialize `document` for `job_id`, replacing any previous one
    pub fn write(&self, job_id: &str, document: &Value) -> Result<()> {
        check_id(job_id)?;
        let io_err = |source| CoreError::StoreIo {
            job_id: job_id.to_string(),
            source,
        };

        let dir = self.root.join(job_id);
        std::fs::create_dir_all(&dir).map_err(io_err)?;

        let bytes = serde_json::to_vec_pretty(document).map_err(|source| {
            CoreError::MalformedResult {
                job_id: job_id.to_string(),
                source,
            }
        })?;

        let tmp = dir.join(format!("{}.tmp", RESULT_FILE_NAME));
        std::fs::write(&tmp, bytes).map_err(io_err)?;
        std::fs::rename(&tmp, dir.join(RESULT_FILE_NAME)).map_err(io_err)?;
        Ok(())
    }

    /// Read the result document for `job_id`; `None` if there is none
    pub fn read(&self, job_id: &str) -> Result<Option<Value>> {
        check_id(job_id)?;
        let bytes = match std::fs::read(self.result_path(job_id)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(CoreError::StoreIo {
                    job_id: job_id.to_string(),
                    source,
                });
            }
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| CoreError::MalformedResult {
                job_id: job_id.to_string(),
                source,
            })
    }
}

fn check_id(job_id: &str) -> Result<()> {
    if is_valid_job_id(job_id) {
        Ok(())
    } else {
        Err(CoreError::InvalidJobId(job_id.to_string()))
    }
}

/// In-memory results of the jobs that already ran in this batch
#[derive(Debug, Clone, Default)]
pub struct BatchResults {
    entries: HashMap<String, Value>,
}

impl BatchResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the result of a job under its declared identifier
    pub fn insert(&mut self, declared_id: impl Into<String>, document: Value) {
        self.entries.insert(declared_id.into(), document);
    }

    pub fn get(&self, declared_id: &str) -> Option<&Value> {
        self.entries.get(declared_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_write_then_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path());
        let document = json!({
            "success": true,
            "data": {"items": [{"id": 1}, {"id": "two"}], "ratio": 0.5, "none": null}
        });

        store.write("Ab3dE5gH9k", &document).unwrap();
        let read = store.read("Ab3dE5gH9k").unwrap().unwrap();
        assert_eq!(read, document);
        assert!(!dir.path().join("Ab3dE5gH9k/result.json.tmp").exists());
    }

    #[test]
    fn test_write_overwrites_previous_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path());

        store.write("job", &json!({"run": 1})).unwrap();
        store.write("job", &json!({"run": 2})).unwrap();
        assert_eq!(store.read("job").unwrap().unwrap(), json!({"run": 2}));
    }

    #[test]
    fn test_read_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path());
        assert!(store.read("nothing").unwrap().is_none());
    }

    #[test]
    fn test_read_malformed_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path());
        std::fs::create_dir_all(dir.path().join("broken")).unwrap();
        std::fs::write(store.result_path("broken"), "{not json").unwrap();

        let err = store.read("broken").unwrap_err();
        assert!(matches!(err, CoreError::MalformedResult { .. }));
    }

    #[test]
    fn test_rejects_path_like_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path());
        assert!(matches!(
            store.read("../outside"),
            Err(CoreError::InvalidJobId(_))
        ));
        assert!(store.write("/abs", &json!({})).is_err());
    }

    #[test]
    fn test_batch_results() {
        let mut results = BatchResults::new();
        assert!(results.is_empty());
        results.insert("build", json!({"ok": true}));
        assert_eq!(results.get("build").unwrap()["ok"], true);
        assert_eq!(results.len(), 1);
    }
}
