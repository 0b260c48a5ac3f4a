//! Local shell executor

use async_trait::async_trait;
use ferrule_core::params;

use super::Executor;
use super::process::{self, ProcessSpec};
use crate::context::ExecutionContext;

/// Runs `product.commands` with `sh -c` on this host
///
/// The process works inside the job sandbox and receives the runner
/// environment plus the job's variables.
pub struct LocalExecutor;

#[async_trait]
impl Executor for LocalExecutor {
    async fn execute(&self, ctx: &ExecutionContext<'_>) -> i32 {
        let commands = ctx
            .product
            .get("commands")
            .and_then(params::command_block)
            .filter(|c| !c.trim().is_empty());
        let Some(commands) = commands else {
            ctx.log.error("No commands defined for local job");
            return 1;
        };

        let spec = ProcessSpec::shell(ctx.resolve(&commands))
            .current_dir(ctx.sandbox_dir())
            .envs(ctx.host_env())
            .timeout(ctx.config.job_timeout);

        let code = process::run(&spec, &ctx.log).await;
        ctx.collect_result_file(&ctx.result_file());
        code
    }
}
