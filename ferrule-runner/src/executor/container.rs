//! Container executor (docker / podman)
//!
//! Runs the job's commands in a throwaway container:
//! - the job sandbox is mounted at `/runner/jobworkdir`
//! - global and job `before_script`, then `commands`, then `script` are
//!   chained with `&&` and run by `sh -c`
//! - a result document written to `$JOB_RESULT_FILE` inside the container
//!   is picked up from the sandbox once the container exits

use anyhow::{Context, Result};
use async_trait::async_trait;
use ferrule_core::domain::log::LogSink;
use ferrule_core::params;
use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::Executor;
use super::process::{self, ProcessSpec, TIMEOUT_EXIT_CODE};
use crate::context::ExecutionContext;

/// Mount point of the job sandbox inside the container
pub const CONTAINER_WORKDIR: &str = "/runner/jobworkdir";

/// Label namespace used when the job sets none
pub const DEFAULT_NAMESPACE: &str = "runner";

const DOCKER_SOCKET: &str = "/var/run/docker.sock";

/// Upper bound for `rm -f` after a timed-out run
const REMOVE_TIMEOUT: Duration = Duration::from_secs(30);

/// Checks that the container CLI `binary` is installed and working
pub fn check_available(binary: &str) -> Result<String> {
    let output = Command::new(binary)
        .arg("--version")
        .output()
        .with_context(|| format!("Failed to execute '{} --version'. Is {} installed?", binary, binary))?;

    if !output.status.success() {
        anyhow::bail!("{} is not working correctly", binary);
    }

    let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
    info!("{} is available: {}", binary, version);
    Ok(version)
}

/// Executor backed by a container CLI
pub struct ContainerExecutor {
    binary: &'static str,
}

impl ContainerExecutor {
    pub fn docker() -> Self {
        Self { binary: "docker" }
    }

    pub fn podman() -> Self {
        Self { binary: "podman" }
    }
}

/// Everything needed to assemble a `run` invocation
#[derive(Debug, Clone)]
pub struct ContainerRun {
    pub binary: String,
    pub name: String,
    pub image: String,
    pub sandbox: PathBuf,
    pub namespace: String,
    pub env: Vec<(String, String)>,
    pub tty: bool,
    pub commands: Vec<String>,
}

impl ContainerRun {
    /// Arguments for `<binary> run ...`
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            self.name.clone(),
        ];
        // Docker-in-docker for jobs that build images
        if self.binary == "docker" {
            args.push("-v".to_string());
            args.push(format!("{}:{}", DOCKER_SOCKET, DOCKER_SOCKET));
        }
        args.push("-v".to_string());
        args.push(format!("{}:{}", self.sandbox.display(), CONTAINER_WORKDIR));
        args.push("-w".to_string());
        args.push(CONTAINER_WORKDIR.to_string());
        args.push("--label".to_string());
        args.push(format!("namespace={}", self.namespace));
        if self.tty {
            args.push("-t".to_string());
        }
        for (key, value) in &self.env {
            args.push("--env".to_string());
            args.push(format!("{}={}", key, value));
        }
        args.push(self.image.clone());
        args.push("sh".to_string());
        args.push("-c".to_string());
        args.push(self.commands.join(" && "));
        args
    }

    /// Arguments for `<binary> rm -f <name>`
    pub fn remove_args(&self) -> Vec<String> {
        vec!["rm".to_string(), "-f".to_string(), self.name.clone()]
    }

    /// Force-remove the container
    ///
    /// Killing the CLI client on timeout leaves the container running on
    /// the daemon.
    pub async fn remove(&self, log: &Arc<dyn LogSink>) {
        log.warning(&format!("Removing container {}", self.name));
        let spec = ProcessSpec::new(self.binary.clone(), self.remove_args())
            .timeout(Some(REMOVE_TIMEOUT));
        let code = process::run(&spec, log).await;
        if code != 0 {
            log.error(&format!(
                "Failed to remove container {} (exit code {})",
                self.name, code
            ));
        }
    }
}

impl ContainerExecutor {
    fn plan(&self, ctx: &ExecutionContext<'_>) -> Result<ContainerRun, String> {
        let image = ctx.param("image").ok_or("No image defined")?;

        let mut commands: Vec<String> = ctx.config.before_script.iter().map(|s| ctx.resolve(s)).collect();
        if let Some(before) = ctx.product.get("before_script") {
            commands.extend(params::lines(before).iter().map(|s| ctx.resolve(s)));
        }
        if let Some(block) = ctx.product.get("commands").and_then(params::command_block) {
            commands.extend(
                block
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(|line| ctx.resolve(line)),
            );
        }
        if let Some(script) = ctx.product.get("script") {
            commands.extend(params::lines(script).iter().map(|s| ctx.resolve(s)));
        }
        if commands.is_empty() {
            return Err("No commands to execute".to_string());
        }

        let namespace = ctx
            .param("namespace")
            .or_else(|| ctx.variables.get("NAMESPACE").map(|ns| ctx.resolve(ns)))
            .filter(|ns| !ns.is_empty())
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());

        let result_file = format!("{}/{}", CONTAINER_WORKDIR, ferrule_core::store::RESULT_FILE_NAME);
        let mut env = ctx.runner_env(&result_file);
        env.push(("JOB_WORKDIR".to_string(), CONTAINER_WORKDIR.to_string()));
        env.extend(ctx.resolved_variables());

        Ok(ContainerRun {
            binary: self.binary.to_string(),
            name: format!("ferrule_{}", ctx.job_id),
            image,
            sandbox: ctx.sandbox_dir(),
            namespace,
            env,
            tty: ctx.wants_tty(),
            commands,
        })
    }
}

#[async_trait]
impl Executor for ContainerExecutor {
    async fn execute(&self, ctx: &ExecutionContext<'_>) -> i32 {
        let run = match self.plan(ctx) {
            Ok(run) => run,
            Err(e) => {
                ctx.log.error(&format!("{} executor: {}", self.binary, e));
                return 1;
            }
        };

        ctx.log.info(&format!("Using image {}", run.image));
        ctx.log.info(&format!("Running: {}", run.commands.join(" && ")));
        ctx.log.info(&format!(
            "Namespace: {}, container: {}, mount: {} -> {}",
            run.namespace,
            run.name,
            run.sandbox.display(),
            CONTAINER_WORKDIR
        ));

        let spec = ProcessSpec::new(self.binary, run.args()).timeout(ctx.config.job_timeout);
        let code = process::run(&spec, &ctx.log).await;
        if code == TIMEOUT_EXIT_CODE {
            run.remove(&ctx.log).await;
        }

        ctx.collect_result_file(&run.sandbox.join(ferrule_core::store::RESULT_FILE_NAME));
        code
    }
}
