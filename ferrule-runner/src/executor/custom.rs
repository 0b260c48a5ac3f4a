//! Custom script executor

use async_trait::async_trait;
use ferrule_core::params;
use serde_json::Value;

use super::Executor;
use super::process::{self, ProcessSpec};
use crate::context::ExecutionContext;

/// Runs `product.script` with `sh -c`, resolving placeholders line by line
///
/// `script` may be a string, a list of lines, or a list containing lists of
/// lines (YAML anchors expand to nested lists).
pub struct CustomExecutor;

impl CustomExecutor {
    fn script(ctx: &ExecutionContext<'_>) -> Option<String> {
        let script = match ctx.product.get("script")? {
            Value::String(s) => ctx.resolve(s),
            other => params::lines(other)
                .iter()
                .map(|line| ctx.resolve(line))
                .collect::<Vec<_>>()
                .join("\n"),
        };
        Some(script).filter(|s| !s.trim().is_empty())
    }
}

#[async_trait]
impl Executor for CustomExecutor {
    async fn execute(&self, ctx: &ExecutionContext<'_>) -> i32 {
        let Some(script) = Self::script(ctx) else {
            ctx.log.error("No script defined for custom job");
            return 1;
        };

        if let Some(previous) = ctx.resolve.previous_job_id {
            ctx.log.debug(&format!("Previous job: {}", previous));
        }

        let spec = ProcessSpec::shell(script)
            .current_dir(ctx.sandbox_dir())
            .envs(ctx.host_env())
            .timeout(ctx.config.job_timeout);

        let code = process::run(&spec, &ctx.log).await;
        ctx.collect_result_file(&ctx.result_file());
        code
    }
}
