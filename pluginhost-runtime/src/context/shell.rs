//! # Shell Shim (§4.8)
//!
//! Subprocess execution gated by `shell.allow`/`shell.deny` (deny wins),
//! `shell.requireConfirmation` (rejected outright — this runtime has no
//! interactive operator to confirm), and a per-command timeout. Grounded on
//! the teacher's `tokio::process` usage pattern in the worker-pool backend,
//! generalized from "spawn the plugin worker" to "spawn an arbitrary allowed
//! command on the plugin's behalf."

use std::process::Stdio;
use std::time::Duration;

use serde::Serialize;
use tokio::process::Command;

use crate::error::RuntimeError;

use super::CapabilityContext;

#[derive(Debug, Clone, Serialize)]
pub struct ShellResult {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

const DEFAULT_SHELL_TIMEOUT: Duration = Duration::from_secs(30);

pub async fn exec(
    ctx: &CapabilityContext,
    command: &str,
    args: &[String],
) -> Result<ShellResult, RuntimeError> {
    if ctx
        .matcher
        .spec
        .shell
        .require_confirmation
        .iter()
        .any(|c| c == command)
    {
        return Err(ctx.permission_denied(format!(
            "command \"{command}\" requires interactive confirmation, unsupported in this runtime"
        )));
    }
    if !ctx.matcher.can_exec_shell(command) {
        return Err(ctx.permission_denied(format!("add \"{command}\" to shell.allow")));
    }

    let timeout = ctx
        .matcher
        .spec
        .shell
        .timeout_ms
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_SHELL_TIMEOUT);

    let mut child = Command::new(command)
        .args(args)
        .current_dir(&ctx.descriptor.cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| RuntimeError::UnknownError {
            message: format!("spawn {command}: {e}"),
        })?;

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| RuntimeError::Timeout)?
        .map_err(|e| RuntimeError::UnknownError {
            message: format!("{command}: {e}"),
        })?;

    Ok(ShellResult {
        code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{Descriptor, HostType};
    use crate::permissions::{PermissionMatcher, PermissionSpec, ShellSpec};
    use pluginhost_sdk::PlatformBundle;
    use serde_json::json;
    use std::sync::Arc;

    fn ctx_with_shell(spec: ShellSpec) -> CapabilityContext {
        let spec = PermissionSpec {
            shell: spec,
            ..Default::default()
        };
        CapabilityContext::new(
            Descriptor {
                host_type: HostType::Cli,
                plugin_id: "demo".to_string(),
                plugin_version: "1.0.0".to_string(),
                request_id: "r1".to_string(),
                parent_request_id: None,
                tenant_id: None,
                invocation_depth: 0,
                cwd: "/tmp".to_string(),
                outdir: None,
                permissions: spec.clone(),
                host_context: json!({}),
            },
            Arc::new(PermissionMatcher::compile(spec)),
            Arc::new(PlatformBundle::default()),
            None,
        )
    }

    #[tokio::test]
    async fn denied_command_never_spawns() {
        let ctx = ctx_with_shell(ShellSpec::default());
        let result = exec(&ctx, "echo", &["hi".to_string()]).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn allowed_command_runs() {
        let ctx = ctx_with_shell(ShellSpec {
            allow: vec!["echo".to_string()],
            ..Default::default()
        });
        let result = exec(&ctx, "echo", &["hi".to_string()]).await.unwrap();
        assert_eq!(result.code, 0);
        assert!(result.stdout.contains("hi"));
    }

    #[tokio::test]
    async fn confirmation_required_command_rejected() {
        let ctx = ctx_with_shell(ShellSpec {
            allow: vec!["*".to_string()],
            require_confirmation: vec!["echo".to_string()],
            ..Default::default()
        });
        let result = exec(&ctx, "echo", &["hi".to_string()]).await;
        assert!(result.is_err());
    }
}
