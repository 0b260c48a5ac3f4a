//! Runner configuration
//!
//! Settings are layered, each layer overriding the one before it:
//! built-in defaults, the YAML config file, environment variables, and
//! finally the command-line flags.

use anyhow::{Context, Result};
use ferrule_core::domain::job::CallbackConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file picked up from the current directory when `--config` is absent
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

/// Runner configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Identifier exported to jobs as `RUNNER_ID`
    pub runner_id: String,

    /// Host name exported to jobs as `RUNNER_HOSTNAME`
    pub hostname: String,

    /// Directory holding one `<job>.log` per job
    pub log_dir: PathBuf,

    /// Root of the per-job working directories
    pub work_dir: PathBuf,

    /// Callback used by jobs that do not declare their own
    pub callback: Option<CallbackConfig>,

    /// Commands run before every container job's own commands
    pub before_script: Vec<String>,

    /// Upper bound for a single executor run; unbounded if unset
    pub job_timeout: Option<Duration>,
}

/// On-disk shape of `config.yaml`
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub default_log_dir: Option<PathBuf>,
    pub default_work_dir: Option<PathBuf>,
    pub before_script: Vec<String>,
    pub callback: Option<CallbackConfig>,
    pub job_timeout_secs: Option<u64>,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new(runner_id: String, hostname: String) -> Self {
        Self {
            runner_id,
            hostname,
            log_dir: PathBuf::from("./logs"),
            work_dir: PathBuf::from("./workdir"),
            callback: None,
            before_script: Vec::new(),
            job_timeout: None,
        }
    }

    /// Loads every layer below the command line
    ///
    /// An explicit `path` must exist; without one, `./config.yaml` is read
    /// only if present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        let file = match path {
            Some(path) => Some(path.to_path_buf()),
            None => Some(PathBuf::from(DEFAULT_CONFIG_FILE)).filter(|p| p.is_file()),
        };
        if let Some(file) = file {
            config.apply_file(read_config_file(&file)?);
        }

        config.apply_vars(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Applies the values set in a config file
    pub fn apply_file(&mut self, file: ConfigFile) {
        if let Some(dir) = file.default_log_dir.filter(|d| !d.as_os_str().is_empty()) {
            self.log_dir = dir;
        }
        if let Some(dir) = file.default_work_dir.filter(|d| !d.as_os_str().is_empty()) {
            self.work_dir = dir;
        }
        if !file.before_script.is_empty() {
            self.before_script = file.before_script;
        }
        if let Some(callback) = file.callback.filter(CallbackConfig::is_configured) {
            self.callback = Some(callback);
        }
        if let Some(secs) = file.job_timeout_secs {
            self.job_timeout = Some(Duration::from_secs(secs));
        }
    }

    /// Applies environment variables, read through `lookup`
    ///
    /// Recognized variables:
    /// - RUNNER_ID, RUNNER_HOSTNAME
    /// - FERRULE_LOG_DIR, FERRULE_WORK_DIR
    /// - FERRULE_CALLBACK_URL, FERRULE_CALLBACK_SECRET
    /// - FERRULE_JOB_TIMEOUT (seconds)
    pub fn apply_vars<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(id) = get("RUNNER_ID") {
            self.runner_id = id;
        }
        if let Some(host) = get("RUNNER_HOSTNAME") {
            self.hostname = host;
        }
        if let Some(dir) = get("FERRULE_LOG_DIR") {
            self.log_dir = PathBuf::from(dir);
        }
        if let Some(dir) = get("FERRULE_WORK_DIR") {
            self.work_dir = PathBuf::from(dir);
        }
        if let Some(url) = get("FERRULE_CALLBACK_URL") {
            let secret = self
                .callback
                .as_ref()
                .map(|c| c.secret.clone())
                .unwrap_or_default();
            self.callback = Some(CallbackConfig { url, secret });
        }
        if let Some(secret) = get("FERRULE_CALLBACK_SECRET") {
            if let Some(callback) = self.callback.as_mut() {
                callback.secret = secret;
            }
        }
        if let Some(secs) = get("FERRULE_JOB_TIMEOUT") {
            let secs: u64 = secs
                .trim()
                .parse()
                .with_context(|| format!("FERRULE_JOB_TIMEOUT is not a number of seconds: {}", secs))?;
            self.job_timeout = Some(Duration::from_secs(secs));
        }

        Ok(())
    }

    /// Applies command-line overrides
    pub fn with_overrides(mut self, log_dir: Option<PathBuf>, work_dir: Option<PathBuf>) -> Self {
        if let Some(dir) = log_dir {
            self.log_dir = dir;
        }
        if let Some(dir) = work_dir {
            self.work_dir = dir;
        }
        self
    }

    /// Makes both directories absolute against the current directory
    ///
    /// Container mounts and the paths exported to jobs need absolute paths.
    pub fn absolutize(mut self) -> Result<Self> {
        self.log_dir = std::path::absolute(&self.log_dir)
            .with_context(|| format!("Invalid log directory {}", self.log_dir.display()))?;
        self.work_dir = std::path::absolute(&self.work_dir)
            .with_context(|| format!("Invalid work directory {}", self.work_dir.display()))?;
        Ok(self)
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        if self.runner_id.is_empty() {
            anyhow::bail!("runner_id cannot be empty");
        }

        if self.log_dir.as_os_str().is_empty() {
            anyhow::bail!("log_dir cannot be empty");
        }

        if self.work_dir.as_os_str().is_empty() {
            anyhow::bail!("work_dir cannot be empty");
        }

        if let Some(callback) = &self.callback {
            if !callback.url.starts_with("http://") && !callback.url.starts_with("https://") {
                anyhow::bail!("callback url must start with http:// or https://");
            }
        }

        if self.job_timeout.is_some_and(|t| t.is_zero()) {
            anyhow::bail!("job_timeout must be greater than 0");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), "localhost".to_string())
    }
}

/// Reads and parses a YAML config file
pub fn read_config_file(path: &Path) -> Result<ConfigFile> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    if source.trim().is_empty() {
        return Ok(ConfigFile::default());
    }
    serde_yaml::from_str(&source)
        .with_context(|| format!("Failed to parse config file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_dir, PathBuf::from("./logs"));
        assert_eq!(config.work_dir, PathBuf::from("./workdir"));
        assert_eq!(config.hostname, "localhost");
        assert!(config.callback.is_none());
        assert!(config.job_timeout.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_apply_file() {
        let file: ConfigFile = serde_yaml::from_str(
            r#"
default_log_dir: /var/log/ferrule
default_work_dir: /srv/ferrule
before_script:
  - apk add curl
callback:
  url: https://hooks.example.com/jobs
  secret: abc
job_timeout_secs: 600
"#,
        )
        .unwrap();

        let mut config = Config::default();
        config.apply_file(file);

        assert_eq!(config.log_dir, PathBuf::from("/var/log/ferrule"));
        assert_eq!(config.work_dir, PathBuf::from("/srv/ferrule"));
        assert_eq!(config.before_script, vec!["apk add curl"]);
        assert_eq!(config.callback.as_ref().unwrap().secret, "abc");
        assert_eq!(config.job_timeout, Some(Duration::from_secs(600)));
    }

    #[test]
    fn test_empty_file_values_keep_defaults() {
        let file: ConfigFile =
            serde_yaml::from_str("default_log_dir: \"\"\ncallback:\n  url: \"\"\n").unwrap();
        let mut config = Config::default();
        config.apply_file(file);

        assert_eq!(config.log_dir, PathBuf::from("./logs"));
        assert!(config.callback.is_none());
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = Config::default();
        config.apply_file(ConfigFile {
            default_log_dir: Some(PathBuf::from("/from/file")),
            callback: Some(CallbackConfig {
                url: "http://file".into(),
                secret: "file-secret".into(),
            }),
            ..Default::default()
        });

        config
            .apply_vars(vars(&[
                ("FERRULE_LOG_DIR", "/from/env"),
                ("FERRULE_CALLBACK_URL", "http://env"),
                ("FERRULE_JOB_TIMEOUT", "30"),
                ("RUNNER_ID", "runner-7"),
            ]))
            .unwrap();

        assert_eq!(config.log_dir, PathBuf::from("/from/env"));
        let callback = config.callback.as_ref().unwrap();
        assert_eq!(callback.url, "http://env");
        assert_eq!(callback.secret, "file-secret");
        assert_eq!(config.job_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.runner_id, "runner-7");
    }

    #[test]
    fn test_invalid_timeout_env() {
        let mut config = Config::default();
        assert!(config.apply_vars(vars(&[("FERRULE_JOB_TIMEOUT", "soon")])).is_err());
    }

    #[test]
    fn test_cli_overrides_win() {
        let config = Config::default().with_overrides(Some(PathBuf::from("/cli/logs")), None);
        assert_eq!(config.log_dir, PathBuf::from("/cli/logs"));
        assert_eq!(config.work_dir, PathBuf::from("./workdir"));
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.callback = Some(CallbackConfig {
            url: "localhost:9000".into(),
            secret: String::new(),
        });
        assert!(config.validate().is_err());

        config.callback = None;
        config.job_timeout = Some(Duration::ZERO);
        assert!(config.validate().is_err());

        config.job_timeout = None;
        config.work_dir = PathBuf::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runner.yaml");
        std::fs::write(&path, "default_work_dir: /tmp/ferrule-work\n").unwrap();

        let file = read_config_file(&path).unwrap();
        assert_eq!(file.default_work_dir, Some(PathBuf::from("/tmp/ferrule-work")));
        assert!(read_config_file(&dir.path().join("missing.yaml")).is_err());
    }

    #[test]
    fn test_absolutize() {
        let config = Config::default().absolutize().unwrap();
        assert!(config.log_dir.is_absolute());
        assert!(config.work_dir.is_absolute());
    }
}
