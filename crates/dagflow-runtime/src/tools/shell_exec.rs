//! `shellExec`: runs a shell command and captures its combined output
//! (§1 tool roster: "shell, file I/O, web fetch, web search, email, webhook";
//! §5 "shell default 30 s").

use async_trait::async_trait;
use dagflow_kernel::tool::{Tool, ToolContext, ToolMetadata};
use dagflow_kernel::{DagFlowError, DagFlowResult};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::process::Command;

const SHELL_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_OUTPUT_CHARS: usize = 10_000;

pub struct ShellExecTool;

#[async_trait]
impl Tool for ShellExecTool {
    fn name(&self) -> &str {
        "shellExec"
    }

    fn description(&self) -> &str {
        "Run a shell command and return its combined stdout/stderr."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["command"],
            "properties": {
                "command": {"type": "string"},
                "cwd": {"type": "string"}
            }
        })
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata { is_dangerous: true, requires_filesystem: true, ..ToolMetadata::default() }
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> DagFlowResult<Value> {
        let command = input
            .get("command")
            .and_then(Value::as_str)
            .ok_or_else(|| DagFlowError::validation("shellExec requires a 'command' string"))?;
        let cwd = input.get("cwd").and_then(Value::as_str);

        if ctx.abort.is_aborted() {
            return Err(DagFlowError::Abort);
        }

        ctx.events.progress(format!("running: {command}"));

        let mut cmd = shell_command(command);
        if let Some(cwd) = cwd {
            cmd.current_dir(ctx.resolve_artifact_path(cwd)?);
        } else {
            cmd.current_dir(&ctx.artifacts_dir);
        }

        let run = async move { cmd.output().await };
        let output = tokio::select! {
            result = tokio::time::timeout(SHELL_TIMEOUT, run) => result
                .map_err(|_| DagFlowError::tool("shellExec", "command timed out after 30s"))?
                .map_err(|e| DagFlowError::tool("shellExec", e.to_string()))?,
            _ = ctx.abort.aborted() => return Err(DagFlowError::Abort),
        };

        let exit_code = output.status.code().unwrap_or(-1);
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        if combined.chars().count() > MAX_OUTPUT_CHARS {
            combined = combined.chars().take(MAX_OUTPUT_CHARS).collect::<String>() + "\n...[truncated]";
        }

        ctx.events.completed(format!("exited with code {exit_code}"));
        Ok(json!({"exitCode": exit_code, "output": combined}))
    }
}

#[cfg(target_os = "windows")]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("powershell");
    cmd.args(["-NoProfile", "-Command", command]);
    cmd
}

#[cfg(not(target_os = "windows"))]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("bash");
    cmd.args(["-lc", command]);
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;
    use dagflow_kernel::storage::memory::InMemoryStore;
    use dagflow_kernel::tool::{AbortHandle, EventEmitter};
    use std::sync::Arc;

    fn ctx() -> ToolContext {
        let (_handle, abort) = AbortHandle::new();
        ToolContext {
            execution_id: "exec_1".into(),
            sub_step_id: "substep_1".into(),
            store: Arc::new(InMemoryStore::new()),
            abort,
            artifacts_dir: std::env::temp_dir(),
            events: EventEmitter::noop(),
        }
    }

    #[tokio::test]
    async fn runs_command_and_captures_output() {
        let tool = ShellExecTool;
        let result = tool.execute(json!({"command": "echo hello"}), &ctx()).await.unwrap();
        assert_eq!(result["exitCode"], 0);
        assert!(result["output"].as_str().unwrap().contains("hello"));
    }

    #[tokio::test]
    async fn nonzero_exit_is_reported_not_errored() {
        let tool = ShellExecTool;
        let result = tool.execute(json!({"command": "exit 3"}), &ctx()).await.unwrap();
        assert_eq!(result["exitCode"], 3);
    }

    #[tokio::test]
    async fn missing_command_is_a_validation_error() {
        let tool = ShellExecTool;
        let err = tool.execute(json!({}), &ctx()).await.unwrap_err();
        assert!(matches!(err, DagFlowError::Validation(_)));
    }
}
