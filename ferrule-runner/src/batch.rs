//! Batch runner
//!
//! Runs an ordered list of jobs one after another. The batch owns the
//! declared-to-runtime id mapping, the in-memory results of finished jobs
//! and the id of the job that ran last; each job sees all three while its
//! placeholders are resolved. A failed job never stops the batch.

use ferrule_core::domain::job::LoadedJob;
use ferrule_core::ids::IdMapping;
use ferrule_core::store::BatchResults;
use tracing::{info, warn};

use crate::driver::{BatchView, JobDriver, JobOutcome};

/// Outcomes of every job in a batch, in execution order
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub outcomes: Vec<JobOutcome>,
}

impl BatchReport {
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(JobOutcome::succeeded)
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.succeeded()).count()
    }
}

pub struct BatchRunner<'a> {
    driver: &'a JobDriver,
    results: BatchResults,
    ids: IdMapping,
    previous_job_id: Option<String>,
}

impl<'a> BatchRunner<'a> {
    pub fn new(driver: &'a JobDriver) -> Self {
        Self {
            driver,
            results: BatchResults::new(),
            ids: IdMapping::new(),
            previous_job_id: None,
        }
    }

    /// Run `jobs` in order
    pub async fn run(mut self, jobs: Vec<LoadedJob>) -> BatchReport {
        let total = jobs.len();
        let mut report = BatchReport::default();

        for (index, mut job) in jobs.into_iter().enumerate() {
            info!(
                "Running job {}/{}: {} ({})",
                index + 1,
                total,
                job.declared_id,
                job.runtime_id
            );
            let outcome = self.run_job(&mut job).await;
            report.outcomes.push(outcome);
        }

        info!(
            "Batch finished: {} job(s), {} failed",
            total,
            report.failed_count()
        );
        report
    }

    async fn run_job(&mut self, job: &mut LoadedJob) -> JobOutcome {
        self.ids.insert(job.declared_id.clone(), job.runtime_id.clone());

        let view = BatchView {
            results: &self.results,
            previous_job_id: self.previous_job_id.as_deref(),
            ids: &self.ids,
        };
        let outcome = self.driver.run(job, view).await;

        match self.driver.store().read(&job.runtime_id) {
            Ok(Some(document)) => self.results.insert(job.declared_id.clone(), document),
            Ok(None) => {}
            Err(e) => warn!(job_id = %job.runtime_id, "Result of '{}' unavailable: {}", job.declared_id, e),
        }
        self.previous_job_id = Some(job.declared_id.clone());

        outcome
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::driver::testing::RecordingNotifier;
    use crate::executor::ExecutorRegistry;
    use ferrule_core::domain::run::JobStatus;
    use ferrule_core::loader::parse_jobs;
    use std::path::PathBuf;
    use std::sync::Arc;

    struct Setup {
        _dir: tempfile::TempDir,
        work_dir: PathBuf,
        driver: JobDriver,
    }

    fn setup() -> Setup {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::new("runner".into(), "host".into());
        config.work_dir = dir.path().join("work");
        config.log_dir = dir.path().join("logs");
        let work_dir = config.work_dir.clone();

        let driver = JobDriver::new(
            Arc::new(config),
            Arc::new(ExecutorRegistry::standard(reqwest::Client::new())),
            Arc::new(RecordingNotifier::new(work_dir.clone())),
        );
        Setup {
            _dir: dir,
            work_dir,
            driver,
        }
    }

    #[tokio::test]
    async fn test_result_flows_into_next_job() {
        let s = setup();
        let jobs = parse_jobs(
            r#"
- job_id: A
  executor: local
  product:
    commands: echo '{"success":true,"data":{"id":"42"}}' > "$JOB_RESULT_FILE"
- job_id: B
  executor: custom
  product:
    script:
      - echo "${A.data.id}" > out.txt
  artifacts:
    - path: out.txt
"#,
        )
        .unwrap();
        let b_runtime = jobs[1].runtime_id.clone();

        let report = BatchRunner::new(&s.driver).run(jobs).await;

        assert!(report.all_succeeded(), "{:?}", report);
        let out = std::fs::read_to_string(s.work_dir.join(&b_runtime).join("out.txt")).unwrap();
        assert_eq!(out.trim(), "42");
    }

    #[tokio::test]
    async fn test_previous_job_id_is_runtime_id() {
        let s = setup();
        let jobs = parse_jobs(
            r#"
- job_id: first
  executor: local
  product:
    commands: "true"
- executor: custom
  product:
    script: echo "${PREVIOUS_JOB_ID}" > prev.txt
  artifacts:
    - path: prev.txt
"#,
        )
        .unwrap();
        let first_runtime = jobs[0].runtime_id.clone();
        let second_runtime = jobs[1].runtime_id.clone();

        BatchRunner::new(&s.driver).run(jobs).await;

        let prev =
            std::fs::read_to_string(s.work_dir.join(&second_runtime).join("prev.txt")).unwrap();
        assert_eq!(prev.trim(), first_runtime);
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_batch() {
        let s = setup();
        let jobs = parse_jobs(
            r#"
- executor: foo
- executor: local
  product:
    commands: exit 3
- executor: local
  product:
    commands: "true"
"#,
        )
        .unwrap();

        let report = BatchRunner::new(&s.driver).run(jobs).await;

        let statuses: Vec<_> = report.outcomes.iter().map(|o| (o.status, o.exit_code)).collect();
        assert_eq!(
            statuses,
            vec![
                (JobStatus::Failed, 1),
                (JobStatus::Failed, 3),
                (JobStatus::Success, 0),
            ]
        );
        assert_eq!(report.failed_count(), 2);
        assert!(!report.all_succeeded());
    }

    #[tokio::test]
    async fn test_unresolved_reference_stays_literal() {
        let s = setup();
        let jobs = parse_jobs(
            r#"
- job_id: only
  executor: custom
  product:
    script: echo '${missing.data}' > out.txt
  artifacts:
    - path: out.txt
"#,
        )
        .unwrap();
        let runtime = jobs[0].runtime_id.clone();

        let report = BatchRunner::new(&s.driver).run(jobs).await;

        assert!(report.all_succeeded());
        let out = std::fs::read_to_string(s.work_dir.join(&runtime).join("out.txt")).unwrap();
        assert_eq!(out.trim(), "${missing.data}");
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let s = setup();
        let report = BatchRunner::new(&s.driver).run(Vec::new()).await;
        assert!(report.outcomes.is_empty());
        assert!(report.all_succeeded());
    }
}
