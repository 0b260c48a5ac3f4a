//! Executor capabilities
//!
//! An executor performs the external action of a job and reports an exit
//! code. It may also leave a result document in the store for later jobs.
//! Executors are registered by name; the job's `executor` field picks one.

mod container;
mod custom;
mod http;
mod local;
pub mod process;
mod proxmox;
mod ssh;

pub use container::{ContainerExecutor, check_available};
pub use custom::CustomExecutor;
pub use http::HttpExecutor;
pub use local::LocalExecutor;
pub use proxmox::ProxmoxExecutor;
pub use ssh::SshExecutor;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::context::ExecutionContext;

/// A pluggable unit of work
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run the job and return its exit code (0 means success)
    ///
    /// Returns only after the external action has finished.
    async fn execute(&self, ctx: &ExecutionContext<'_>) -> i32;
}

/// Executors available to the driver, by name
#[derive(Default, Clone)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn Executor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in executor
    pub fn standard(client: reqwest::Client) -> Self {
        let mut registry = Self::new();
        registry.register("local", Arc::new(LocalExecutor));
        registry.register("custom", Arc::new(CustomExecutor));
        registry.register("ssh", Arc::new(SshExecutor));
        registry.register("docker", Arc::new(ContainerExecutor::docker()));
        registry.register("podman", Arc::new(ContainerExecutor::podman()));
        registry.register("proxmox", Arc::new(ProxmoxExecutor::new(client.clone())));
        registry.register("http", Arc::new(HttpExecutor::new(client)));
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, executor: Arc<dyn Executor>) {
        self.executors.insert(name.into(), executor);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Executor>> {
        self.executors.get(name).cloned()
    }

    /// Registered executor names, sorted
    pub fn capabilities(&self) -> Vec<String> {
        let mut names: Vec<String> = self.executors.keys().cloned().collect();
        names.sort();
        names
    }
}
