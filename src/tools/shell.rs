use super::common::{parse_args, truncate_output};
use super::traits::{ExecutionContext, Tool};
use super::types::{ToolKind, ToolPayload};
use crate::error::ToolError;
use serde::Deserialize;
use serde_json::{Value, json};
use std::future::Future;
use std::pin::Pin;

/// Environment variables safe to pass to shell commands.
/// Only functional variables are included -- never API keys or secrets.
const SAFE_ENV_VARS: &[&str] = &[
    "PATH", "HOME", "TERM", "LANG", "LC_ALL", "LC_CTYPE", "USER", "SHELL", "TMPDIR",
];

#[derive(Deserialize)]
struct ShellArgs {
    command: String,
    #[serde(default)]
    working_dir: Option<String>,
}

/// Fallback for anything no dedicated tool covers.
pub struct ShellTool;

impl Tool for ShellTool {
    fn kind(&self) -> ToolKind {
        ToolKind::RunShellCommand
    }

    fn description(&self) -> &str {
        "Execute a shell command in the repository and return its exit code and output. \
         Use only when no specific tool exists for the task"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                },
                "working_dir": {
                    "type": "string",
                    "description": "Directory to run in, relative to the repository root"
                }
            },
            "required": ["command"]
        })
    }

    fn execute<'a>(
        &'a self,
        args: Value,
        ctx: &'a ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = Result<ToolPayload, ToolError>> + Send + 'a>> {
        Box::pin(async move {
            let args: ShellArgs = parse_args(self.kind(), args)?;
            let cwd = match args.working_dir.as_deref().map(str::trim) {
                Some(dir) if !dir.is_empty() => ctx.resolve(dir)?,
                _ => ctx.repo_root.clone(),
            };

            // Clear the environment so credentials never reach the child,
            // then re-add only functional variables.
            let mut cmd = tokio::process::Command::new("sh");
            cmd.arg("-c")
                .arg(&args.command)
                .current_dir(&cwd)
                .stdin(std::process::Stdio::null())
                .env_clear()
                .kill_on_drop(true);
            for var in SAFE_ENV_VARS {
                if let Ok(val) = std::env::var(var) {
                    cmd.env(var, val);
                }
            }

            tracing::debug!(command = %args.command, cwd = %cwd.display(), "running shell command");
            let output = match tokio::time::timeout(ctx.shell_timeout, cmd.output()).await {
                Ok(Ok(output)) => output,
                Ok(Err(e)) => {
                    return Err(ToolError::Command(format!("Error executing command: {e}")));
                }
                Err(_) => {
                    return Err(ToolError::Timeout {
                        what: format!("command `{}`", args.command),
                        secs: ctx.shell_timeout.as_secs(),
                    });
                }
            };

            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            let mut parts = Vec::new();
            if !stdout.is_empty() {
                parts.push(stdout.into_owned());
            }
            if !stderr.is_empty() {
                parts.push(format!("[stderr]: {stderr}"));
            }
            let combined = if parts.is_empty() {
                "(no output)".to_string()
            } else {
                parts.join("\n")
            };
            let code = output
                .status
                .code()
                .map_or_else(|| "signal".to_string(), |c| c.to_string());
            Ok(ToolPayload::Text(format!(
                "Exit code: {code}\n{}",
                truncate_output(&combined, ctx.max_output_chars)
            )))
        })
    }
}
