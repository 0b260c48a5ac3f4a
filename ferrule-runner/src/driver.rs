//! Job lifecycle driver
//!
//! Drives one job through `pending -> running -> success | failed`:
//!
//! 1. prepare: job directory, sandbox, log file; status `pending`
//! 2. start: status `running`, "running" callback
//! 3. dispatch: shortcut expansion, executor lookup and invocation
//! 4. finish: exit code decides `success` or `failed`
//! 5. collect artifacts, remove the sandbox
//! 6. completion callback
//!
//! Every transition is written to `status.yaml` before anything that
//! depends on it happens. Only a failure to provision the log file stops a
//! job early (`pending -> failed`, no callbacks).

use anyhow::{Context, Result};
use ferrule_core::domain::job::{CallbackConfig, LoadedJob};
use ferrule_core::domain::log::LogSink;
use ferrule_core::domain::run::{JobRun, JobStatus};
use ferrule_core::ids::IdMapping;
use ferrule_core::placeholder::ResolveContext;
use ferrule_core::shortcuts::apply_shortcut;
use ferrule_core::store::{BatchResults, ResultStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::artifacts::{self, SANDBOX_DIR};
use crate::config::Config;
use crate::context::ExecutionContext;
use crate::executor::ExecutorRegistry;
use crate::notify::{CompletionPayload, Notifier};
use crate::sinks::FileLogSink;
use crate::status::write_status;

/// Batch state a job may reference while it runs
#[derive(Debug, Clone, Copy)]
pub struct BatchView<'a> {
    pub results: &'a BatchResults,
    pub previous_job_id: Option<&'a str>,
    pub ids: &'a IdMapping,
}

/// Final state of a job, as reported to the caller
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    pub declared_id: String,
    pub runtime_id: String,
    pub status: JobStatus,
    pub exit_code: i32,
    pub log_file: Option<PathBuf>,
    /// Artifact files copied into the job directory
    pub artifacts: Vec<PathBuf>,
}

impl JobOutcome {
    fn new(job: &LoadedJob, run: &JobRun, artifacts: Vec<PathBuf>) -> Self {
        Self {
            declared_id: job.declared_id.clone(),
            runtime_id: job.runtime_id.clone(),
            status: run.status(),
            exit_code: run.exit_code(),
            log_file: run.log_file.clone(),
            artifacts,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == JobStatus::Success
    }
}

/// Result of `prepare`
pub enum Provisioned {
    /// Resources are in place; the job may start
    Ready(JobRun, Arc<dyn LogSink>),
    /// The job failed before starting
    Aborted(JobRun),
}

/// Runs single jobs from definition to terminal status
pub struct JobDriver {
    config: Arc<Config>,
    registry: Arc<ExecutorRegistry>,
    notifier: Arc<dyn Notifier>,
    store: ResultStore,
}

impl JobDriver {
    pub fn new(
        config: Arc<Config>,
        registry: Arc<ExecutorRegistry>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let store = ResultStore::new(config.work_dir.clone());
        Self {
            config,
            registry,
            notifier,
            store,
        }
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    /// Run `job` through its whole lifecycle
    pub async fn run(&self, job: &mut LoadedJob, view: BatchView<'_>) -> JobOutcome {
        let (mut run, log) = match self.prepare(job) {
            Provisioned::Ready(run, log) => (run, log),
            Provisioned::Aborted(run) => return JobOutcome::new(job, &run, Vec::new()),
        };

        self.start(job, &mut run, &*log).await;
        let exit_code = self.dispatch(job, &run, log.clone(), view).await;
        self.finish(&mut run, exit_code, &*log);
        let artifacts = self.collect_artifacts(job, &run, &*log);
        self.cleanup(&run, &*log);
        self.notify_completion(job, &run, &*log).await;

        JobOutcome::new(job, &run, artifacts)
    }

    /// Create the job's directories and log file and record `pending`
    pub fn prepare(&self, job: &LoadedJob) -> Provisioned {
        let job_dir = self.config.work_dir.join(&job.runtime_id);
        let mut run = JobRun::new(job.runtime_id.clone(), job_dir);

        match self.provision(&mut run) {
            Ok(log) => {
                self.persist(&run, Some(&*log));
                info!(
                    job_id = %job.runtime_id,
                    "Prepared job '{}' (executor: {})",
                    job.declared_id, job.definition.executor
                );
                Provisioned::Ready(run, log)
            }
            Err(e) => {
                warn!(job_id = %job.runtime_id, "Failed to provision job: {:#}", e);
                if let Err(e) = run.abort(1) {
                    warn!(job_id = %job.runtime_id, "{}", e);
                }
                self.persist(&run, None);
                Provisioned::Aborted(run)
            }
        }
    }

    fn provision(&self, run: &mut JobRun) -> Result<Arc<dyn LogSink>> {
        let sandbox = run.work_dir.join(SANDBOX_DIR);
        std::fs::create_dir_all(&sandbox)
            .with_context(|| format!("Failed to create {}", sandbox.display()))?;
        std::fs::create_dir_all(&self.config.log_dir).with_context(|| {
            format!("Failed to create log directory {}", self.config.log_dir.display())
        })?;

        let path = self.config.log_dir.join(format!("{}.log", run.runtime_id));
        let sink = FileLogSink::create(run.runtime_id.clone(), &path)
            .with_context(|| format!("Failed to create log file {}", path.display()))?;
        run.log_file = Some(path);
        Ok(Arc::new(sink))
    }

    /// `pending -> running`, then the "running" callback
    pub async fn start(&self, job: &LoadedJob, run: &mut JobRun, log: &dyn LogSink) {
        if let Err(e) = run.start() {
            log.error(&e.to_string());
            return;
        }
        self.persist(run, Some(log));
        log.info(&format!("Starting job: {} ({})", job.declared_id, job.runtime_id));
        self.notify(job, run, log).await;
    }

    /// Hand the job to its executor and return the exit code
    pub async fn dispatch(
        &self,
        job: &mut LoadedJob,
        run: &JobRun,
        log: Arc<dyn LogSink>,
        view: BatchView<'_>,
    ) -> i32 {
        if apply_shortcut(&mut job.definition) {
            log.debug(&format!("Expanded job type '{}'", job.definition.kind));
        }

        let Some(executor) = self.registry.get(&job.definition.executor) else {
            log.error(&format!(
                "Unknown executor '{}', aborted",
                job.definition.executor
            ));
            return 1;
        };

        let ctx = ExecutionContext {
            job_id: &job.runtime_id,
            product: &job.definition.product,
            variables: &job.definition.variables,
            log,
            job_dir: &run.work_dir,
            resolve: ResolveContext::new(&self.store, view.results, view.previous_job_id, view.ids),
            config: &self.config,
        };
        executor.execute(&ctx).await
    }

    /// Record the exit code and the terminal status
    pub fn finish(&self, run: &mut JobRun, exit_code: i32, log: &dyn LogSink) {
        match run.finish(exit_code) {
            Ok(JobStatus::Success) => log.info(&format!("Job finished successfully: {}", run.runtime_id)),
            Ok(_) => log.error(&format!(
                "Job failed: {} (exit code {})",
                run.runtime_id, exit_code
            )),
            Err(e) => log.error(&e.to_string()),
        }
        self.persist(run, Some(log));
    }

    pub fn collect_artifacts(&self, job: &LoadedJob, run: &JobRun, log: &dyn LogSink) -> Vec<PathBuf> {
        artifacts::collect(&run.work_dir, &job.definition.artifacts, log)
    }

    pub fn cleanup(&self, run: &JobRun, log: &dyn LogSink) {
        artifacts::remove_sandbox(&run.work_dir, log);
    }

    /// Final callback, after the terminal status is on disk
    pub async fn notify_completion(&self, job: &LoadedJob, run: &JobRun, log: &dyn LogSink) {
        self.notify(job, run, log).await;
    }

    /// Job-level callback if set, else the runner default
    fn callback_target<'a>(&'a self, job: &'a LoadedJob) -> Option<&'a CallbackConfig> {
        job.definition
            .callback_target()
            .or_else(|| self.config.callback.as_ref().filter(|c| c.is_configured()))
    }

    async fn notify(&self, job: &LoadedJob, run: &JobRun, log: &dyn LogSink) {
        let Some(target) = self.callback_target(job) else {
            return;
        };

        let payload = CompletionPayload {
            job_id: run.runtime_id.clone(),
            status: run.status(),
            exit_code: run.exit_code(),
            log_file: run
                .log_file
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default(),
            artifacts: job.definition.artifacts.clone(),
        };

        match self.notifier.notify(target, &payload).await {
            Ok(()) => log.info(&format!("Callback '{}' sent to {}", run.status(), target.url)),
            Err(e) => log.error(&format!("Callback to {} failed: {}", target.url, e)),
        }
    }

    fn persist(&self, run: &JobRun, log: Option<&dyn LogSink>) {
        if let Err(e) = write_status(&run.work_dir, &run.status_record()) {
            let message = format!("Failed to persist status '{}': {:#}", run.status(), e);
            match log {
                Some(log) => log.error(&message),
                None => warn!(job_id = %run.runtime_id, "{}", message),
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Test doubles shared by driver and batch tests

    use super::*;
    use crate::notify::NotifyError;
    use crate::status::read_status;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// One delivered callback: target url, payload status, status on disk
    #[derive(Debug, Clone, PartialEq)]
    pub struct Delivery {
        pub url: String,
        pub status: JobStatus,
        pub persisted: Option<JobStatus>,
    }

    /// Notifier that records deliveries, checking what was persisted first
    pub struct RecordingNotifier {
        work_dir: PathBuf,
        fail: bool,
        pub deliveries: Mutex<Vec<Delivery>>,
    }

    impl RecordingNotifier {
        pub fn new(work_dir: PathBuf) -> Self {
            Self {
                work_dir,
                fail: false,
                deliveries: Mutex::new(Vec::new()),
            }
        }

        pub fn failing(work_dir: PathBuf) -> Self {
            Self {
                fail: true,
                ..Self::new(work_dir)
            }
        }

        pub fn deliveries(&self) -> Vec<Delivery> {
            self.deliveries.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(
            &self,
            target: &CallbackConfig,
            payload: &CompletionPayload,
        ) -> std::result::Result<(), NotifyError> {
            let persisted = read_status(&self.work_dir.join(&payload.job_id))
                .ok()
                .map(|record| record.status);
            self.deliveries.lock().unwrap().push(Delivery {
                url: target.url.clone(),
                status: payload.status,
                persisted,
            });
            if self.fail {
                return Err(NotifyError::Rejected {
                    status: 503,
                    body: "unavailable".into(),
                });
            }
            Ok(())
        }
    }
}
