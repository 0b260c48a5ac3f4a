//! Subprocess execution with streamed output
//!
//! Standard output and standard error are read line by line while the
//! process runs and written to the job log as they arrive. `run` returns
//! only once the process has exited (or was killed on timeout).

use ferrule_core::domain::log::{LogLevel, LogSink};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::{AbortHandle, JoinHandle};

/// Exit code reported when a process is killed for exceeding the timeout
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// A process to run for a job
#[derive(Debug, Clone, Default)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Added on top of the inherited environment
    pub env: Vec<(String, String)>,
    pub timeout: Option<Duration>,
}

impl ProcessSpec {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            ..Default::default()
        }
    }

    /// `sh -c <script>`
    pub fn shell(script: impl Into<String>) -> Self {
        Self::new("sh", vec!["-c".to_string(), script.into()])
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn envs(mut self, env: Vec<(String, String)>) -> Self {
        self.env.extend(env);
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Run `spec` to completion and return its exit code
///
/// Spawn failures and signal terminations map to 1.
pub async fn run(spec: &ProcessSpec, log: &Arc<dyn LogSink>) -> i32 {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &spec.cwd {
        cmd.current_dir(dir);
    }

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            log.error(&format!("Failed to spawn {}: {}", spec.program, e));
            return 1;
        }
    };

    let stdout_task = child
        .stdout
        .take()
        .map(|out| tokio::spawn(forward(out, log.clone(), LogLevel::Info)));
    let stderr_task = child
        .stderr
        .take()
        .map(|err| tokio::spawn(forward(err, log.clone(), LogLevel::Error)));

    let readers: Vec<JoinHandle<()>> = [stdout_task, stderr_task].into_iter().flatten().collect();
    let abort_handles: Vec<AbortHandle> = readers.iter().map(JoinHandle::abort_handle).collect();

    // Output is drained under the same deadline: background children may
    // keep the pipes open after the shell itself has exited.
    let finished = async {
        let status = child.wait().await;
        for reader in readers {
            let _ = reader.await;
        }
        status
    };
    let status = match spec.timeout {
        Some(limit) => tokio::time::timeout(limit, finished).await.ok(),
        None => Some(finished.await),
    };

    let Some(status) = status else {
        log.error(&format!(
            "Process exceeded the job timeout of {:?}, killing it",
            spec.timeout.unwrap_or_default()
        ));
        // The process itself may already be gone, with only its output pending
        if !matches!(child.try_wait(), Ok(Some(_))) {
            if let Err(e) = child.kill().await {
                log.error(&format!("Failed to kill process: {}", e));
            }
        }
        for handle in abort_handles {
            handle.abort();
        }
        return TIMEOUT_EXIT_CODE;
    };

    match status {
        Ok(status) => match status.code() {
            Some(code) => code,
            None => {
                log.error(&format!("{} was terminated by a signal", spec.program));
                1
            }
        },
        Err(e) => {
            log.error(&format!("Failed to wait for {}: {}", spec.program, e));
            1
        }
    }
}

async fn forward<R>(reader: R, log: Arc<dyn LogSink>, level: LogLevel)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => log.write(level, &line),
            Ok(None) => break,
            Err(e) => {
                log.warning(&format!("Stopped reading process output: {}", e));
                break;
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use ferrule_core::domain::log::MemoryLogSink;

    fn sink() -> (Arc<MemoryLogSink>, Arc<dyn LogSink>) {
        let memory = Arc::new(MemoryLogSink::new());
        let log: Arc<dyn LogSink> = memory.clone();
        (memory, log)
    }

    #[tokio::test]
    async fn test_output_is_streamed_with_levels() {
        let (memory, log) = sink();
        let code = run(&ProcessSpec::shell("echo out; echo err >&2"), &log).await;

        assert_eq!(code, 0);
        let entries = memory.entries();
        assert!(entries.iter().any(|e| e.message == "out" && e.level == LogLevel::Info));
        assert!(entries.iter().any(|e| e.message == "err" && e.level == LogLevel::Error));
    }

    #[tokio::test]
    async fn test_exit_code_is_returned() {
        let (_, log) = sink();
        assert_eq!(run(&ProcessSpec::shell("exit 7"), &log).await, 7);
    }

    #[tokio::test]
    async fn test_env_and_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let (memory, log) = sink();
        let spec = ProcessSpec::shell("echo \"$GREETING from $(pwd)\"")
            .current_dir(dir.path())
            .envs(vec![("GREETING".into(), "hello".into())]);

        assert_eq!(run(&spec, &log).await, 0);
        let expected = format!("hello from {}", dir.path().canonicalize().unwrap().display());
        assert!(memory.entries().iter().any(|e| e.message == expected));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_exit_one() {
        let (memory, log) = sink();
        let spec = ProcessSpec::new("/definitely/not/a/program", vec![]);

        assert_eq!(run(&spec, &log).await, 1);
        assert!(memory.contains("Failed to spawn"));
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let (memory, log) = sink();
        let spec = ProcessSpec::shell("sleep 5").timeout(Some(Duration::from_millis(200)));

        assert_eq!(run(&spec, &log).await, TIMEOUT_EXIT_CODE);
        assert!(memory.contains("timeout"));
    }

    #[tokio::test]
    async fn test_timeout_covers_inherited_pipes() {
        let (memory, log) = sink();
        let spec = ProcessSpec::shell("sleep 5 & echo started")
            .timeout(Some(Duration::from_millis(500)));
        let started = std::time::Instant::now();

        assert_eq!(run(&spec, &log).await, TIMEOUT_EXIT_CODE);
        assert!(started.elapsed() < Duration::from_secs(3));
        assert!(memory.contains("timeout"));
    }
}
