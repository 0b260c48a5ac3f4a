//! Remote shell executor

use async_trait::async_trait;
use ferrule_core::params;

use super::Executor;
use super::process::{self, ProcessSpec};
use crate::context::ExecutionContext;

/// Runs `product.commands` on `product.host` through the `ssh` client
pub struct SshExecutor;

/// Default remote user when `product.user` is absent
pub const DEFAULT_SSH_USER: &str = "root";

/// Arguments for the `ssh` client that run `commands` remotely
///
/// No local shell is involved; `commands` reaches the remote shell as one
/// argument. `--` ends option parsing so nothing after it is read as an
/// `ssh` flag.
pub fn ssh_args(user: &str, host: &str, commands: &str) -> Result<Vec<String>, String> {
    for (what, value) in [("user", user), ("host", host)] {
        if value.starts_with('-') || value.contains(|c: char| c.is_whitespace() || c == '@') {
            return Err(format!("Invalid SSH {}: '{}'", what, value));
        }
    }
    Ok(vec![
        "--".to_string(),
        format!("{}@{}", user, host),
        commands.to_string(),
    ])
}

#[async_trait]
impl Executor for SshExecutor {
    async fn execute(&self, ctx: &ExecutionContext<'_>) -> i32 {
        let Some(host) = ctx.param("host") else {
            ctx.log.error("No SSH host defined for job");
            return 1;
        };
        let user = ctx.param("user").unwrap_or_else(|| DEFAULT_SSH_USER.to_string());

        let commands = ctx
            .product
            .get("commands")
            .and_then(params::command_block)
            .map(|c| ctx.resolve(&c))
            .filter(|c| !c.trim().is_empty());
        let Some(commands) = commands else {
            ctx.log.error("No commands defined for SSH job");
            return 1;
        };

        let args = match ssh_args(&user, &host, &commands) {
            Ok(args) => args,
            Err(e) => {
                ctx.log.error(&e);
                return 1;
            }
        };

        ctx.log.info(&format!("Connecting to {}@{}", user, host));
        let spec = ProcessSpec::new("ssh", args)
            .current_dir(ctx.sandbox_dir())
            .envs(ctx.host_env())
            .timeout(ctx.config.job_timeout);

        process::run(&spec, &ctx.log).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::Fixture;
    use serde_json::json;

    #[test]
    fn test_ssh_args() {
        assert_eq!(
            ssh_args("root", "web01", "echo 'hi' && ls").unwrap(),
            vec!["--", "root@web01", "echo 'hi' && ls"]
        );
    }

    #[test]
    fn test_option_like_destination_is_rejected() {
        assert!(ssh_args("root", "-oProxyCommand=touch x", "uptime").is_err());
        assert!(ssh_args("-l", "web01", "uptime").is_err());
        assert!(ssh_args("root", "10.0.0.2 -o X=1; touch pwned #", "uptime").is_err());
    }

    #[tokio::test]
    async fn test_host_from_earlier_result_cannot_reach_local_shell() {
        let mut fx = Fixture::new(json!({"host": "${A.host}", "commands": "uptime"}));
        let marker = fx.job_dir.join("mnt/pwned");
        fx.results.insert(
            "A",
            json!({"host": format!("127.0.0.1; touch {} #", marker.display())}),
        );

        assert_eq!(SshExecutor.execute(&fx.ctx()).await, 1);
        assert!(fx.log.contains("Invalid SSH host"));
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_missing_host_fails_without_running() {
        let fx = Fixture::new(json!({"commands": "uptime"}));
        assert_eq!(SshExecutor.execute(&fx.ctx()).await, 1);
        assert!(fx.log.contains("No SSH host"));
    }

    #[tokio::test]
    async fn test_missing_commands_fail() {
        let fx = Fixture::new(json!({"host": "web01"}));
        assert_eq!(SshExecutor.execute(&fx.ctx()).await, 1);
        assert!(fx.log.contains("No commands"));
    }
}
