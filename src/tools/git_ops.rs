use super::common::parse_args;
use super::traits::{ExecutionContext, Tool};
use super::types::{ToolKind, ToolPayload};
use crate::error::ToolError;
use serde::Deserialize;
use serde_json::{Value, json};
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::time::Duration;

/// Run `git <args>` in `repo_root`, returning trimmed stdout on success.
///
/// A non-zero exit becomes [`ToolError::Command`] carrying stderr (or stdout
/// when stderr is empty). The process is killed when the timeout elapses.
pub(crate) async fn run_git(
    repo_root: &Path,
    args: &[&str],
    timeout: Duration,
) -> Result<String, ToolError> {
    let mut cmd = tokio::process::Command::new("git");
    cmd.args(args)
        .current_dir(repo_root)
        .stdin(std::process::Stdio::null())
        .kill_on_drop(true);

    let what = format!("git {}", args.first().copied().unwrap_or_default());
    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ToolError::Command(
                "Git is not installed or not in PATH.".to_string(),
            ));
        }
        Ok(Err(e)) => return Err(ToolError::Command(format!("Error running {what}: {e}"))),
        Err(_) => {
            return Err(ToolError::Timeout {
                what,
                secs: timeout.as_secs(),
            });
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if output.status.success() {
        return Ok(stdout);
    }
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    Err(ToolError::Command(if stderr.is_empty() { stdout } else { stderr }))
}

/// Apply the branch naming policy: required prefix, lowercase, spaces to
/// dashes, and only `[a-z0-9-_/]` kept.
pub fn sanitize_branch_name(prefix: &str, name: &str) -> String {
    let name = name.trim();
    let prefixed = if name.starts_with(prefix) {
        name.to_string()
    } else {
        format!("{prefix}{name}")
    };
    prefixed
        .replace(' ', "-")
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '/'))
        .collect()
}

#[derive(Deserialize)]
struct BranchArgs {
    name: String,
}

#[derive(Deserialize)]
struct CheckoutArgs {
    branch: String,
}

#[derive(Deserialize)]
struct AddArgs {
    files: String,
}

#[derive(Deserialize)]
struct CommitArgs {
    message: String,
}

#[derive(Deserialize, Default)]
struct DiffArgs {
    #[serde(default)]
    staged: bool,
}

/// One catalog entry per git subcommand; `kind` selects which.
pub struct GitTool {
    kind: ToolKind,
}

impl GitTool {
    pub const KINDS: [ToolKind; 8] = [
        ToolKind::GitFetchAll,
        ToolKind::GitCreateBranch,
        ToolKind::GitCheckout,
        ToolKind::GitAdd,
        ToolKind::GitCommit,
        ToolKind::GitDiff,
        ToolKind::GitStatus,
        ToolKind::GitCurrentBranch,
    ];

    /// `None` for kinds that are not git commands.
    pub fn new(kind: ToolKind) -> Option<Self> {
        Self::KINDS.contains(&kind).then_some(Self { kind })
    }

    async fn run(&self, args: Value, ctx: &ExecutionContext) -> Result<String, ToolError> {
        let root = ctx.repo_root.as_path();
        let timeout = ctx.git_timeout;
        match self.kind {
            ToolKind::GitFetchAll => {
                let out = run_git(root, &["fetch", "--all"], timeout).await?;
                Ok(if out.is_empty() {
                    "Successfully fetched all branches.".to_string()
                } else {
                    format!("Successfully fetched all branches.\n{out}")
                })
            }
            ToolKind::GitCreateBranch => {
                let args: BranchArgs = parse_args(self.kind, args)?;
                let branch = sanitize_branch_name(&ctx.branch_prefix, &args.name);
                run_git(root, &["checkout", "-b", &branch], timeout).await?;
                Ok(format!(
                    "Successfully created and switched to branch '{branch}'."
                ))
            }
            ToolKind::GitCheckout => {
                let args: CheckoutArgs = parse_args(self.kind, args)?;
                run_git(root, &["checkout", &args.branch], timeout).await?;
                Ok(format!("Successfully switched to branch '{}'.", args.branch))
            }
            ToolKind::GitAdd => {
                let args: AddArgs = parse_args(self.kind, args)?;
                let files: Vec<&str> = args
                    .files
                    .split(',')
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .collect();
                if files.is_empty() {
                    return Err(ToolError::InvalidArguments {
                        tool: self.kind.to_string(),
                        message: "no files given".into(),
                    });
                }
                for file in &files {
                    ctx.resolve(file)?;
                }
                let mut git_args = vec!["add", "--"];
                git_args.extend(files.iter().copied());
                run_git(root, &git_args, timeout).await?;
                Ok(format!("Successfully staged files: {}", files.join(", ")))
            }
            ToolKind::GitCommit => {
                let args: CommitArgs = parse_args(self.kind, args)?;
                let out = run_git(root, &["commit", "-m", &args.message], timeout).await?;
                Ok(format!("Successfully committed changes.\n{out}"))
            }
            ToolKind::GitDiff => {
                let args: DiffArgs = if args.is_null() {
                    DiffArgs::default()
                } else {
                    parse_args(self.kind, args)?
                };
                let git_args: &[&str] = if args.staged {
                    &["diff", "--staged"]
                } else {
                    &["diff"]
                };
                let out = run_git(root, git_args, timeout).await?;
                Ok(if out.is_empty() {
                    "No changes to show.".to_string()
                } else {
                    out
                })
            }
            ToolKind::GitStatus => {
                let out = run_git(root, &["status", "--short"], timeout).await?;
                Ok(if out.is_empty() {
                    "Working tree clean, no changes.".to_string()
                } else {
                    out
                })
            }
            ToolKind::GitCurrentBranch => current_branch(ctx).await,
            other => Err(ToolError::Unknown {
                name: other.to_string(),
            }),
        }
    }
}

/// Name of the checked-out branch.
pub(crate) async fn current_branch(ctx: &ExecutionContext) -> Result<String, ToolError> {
    run_git(&ctx.repo_root, &["branch", "--show-current"], ctx.git_timeout).await
}

impl Tool for GitTool {
    fn kind(&self) -> ToolKind {
        self.kind
    }

    fn description(&self) -> &str {
        match self.kind {
            ToolKind::GitFetchAll => "Fetch all branches from all remotes",
            ToolKind::GitCreateBranch => {
                "Create and switch to a new branch. The 'agent-' prefix is added automatically"
            }
            ToolKind::GitCheckout => "Switch to an existing branch",
            ToolKind::GitAdd => "Stage files for commit (comma-separated paths, or '.')",
            ToolKind::GitCommit => {
                "Commit staged changes. Pushing is requested from the user afterwards"
            }
            ToolKind::GitDiff => "Show unstaged changes, or staged changes when staged=true",
            ToolKind::GitStatus => "Show the short working tree status",
            ToolKind::GitCurrentBranch => "Show the name of the current branch",
            _ => "",
        }
    }

    fn parameters_schema(&self) -> Value {
        let (properties, required) = match self.kind {
            ToolKind::GitCreateBranch => (
                json!({"name": {"type": "string", "description": "Branch name"}}),
                json!(["name"]),
            ),
            ToolKind::GitCheckout => (
                json!({"branch": {"type": "string", "description": "Branch to switch to"}}),
                json!(["branch"]),
            ),
            ToolKind::GitAdd => (
                json!({"files": {"type": "string", "description": "Comma-separated file paths"}}),
                json!(["files"]),
            ),
            ToolKind::GitCommit => (
                json!({"message": {"type": "string", "description": "Commit message"}}),
                json!(["message"]),
            ),
            ToolKind::GitDiff => (
                json!({"staged": {"type": "boolean", "description": "Diff staged changes"}}),
                json!([]),
            ),
            _ => (json!({}), json!([])),
        };
        json!({
            "type": "object",
            "properties": properties,
            "required": required
        })
    }

    fn execute<'a>(
        &'a self,
        args: Value,
        ctx: &'a ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = Result<ToolPayload, ToolError>> + Send + 'a>> {
        Box::pin(async move { self.run(args, ctx).await.map(ToolPayload::Text) })
    }
}
