//! The push step. Never exposed as a tool: the oracle reaches it only by
//! committing, which opens the push gate.

use crate::error::{ToolError, WorkflowError};
use crate::tools::ExecutionContext;
use crate::tools::git_ops::{current_branch, run_git};
use serde::{Deserialize, Serialize};

/// What an approved push would publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushRequest {
    pub branch: String,
    pub commit_count: usize,
    pub files_changed: Vec<String>,
}

/// Describe the unpublished commits on the current branch.
pub async fn inspect_push(ctx: &ExecutionContext) -> Result<PushRequest, WorkflowError> {
    let git = |e: ToolError| WorkflowError::Git(e.to_string());

    let branch = current_branch(ctx).await.map_err(git)?;
    if branch.is_empty() {
        return Err(WorkflowError::Git("HEAD is detached; nothing to push".into()));
    }
    let count = run_git(
        &ctx.repo_root,
        &["rev-list", "--count", "HEAD", "--not", "--remotes"],
        ctx.git_timeout,
    )
    .await
    .map_err(git)?;
    let commit_count = count
        .trim()
        .parse()
        .map_err(|_| WorkflowError::Git(format!("unexpected rev-list output: {count}")))?;
    let log = run_git(
        &ctx.repo_root,
        &["log", "--name-only", "--pretty=format:", "HEAD", "--not", "--remotes"],
        ctx.git_timeout,
    )
    .await
    .map_err(git)?;

    let mut files_changed: Vec<String> = Vec::new();
    for file in log.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if !files_changed.iter().any(|f| f == file) {
            files_changed.push(file.to_string());
        }
    }
    Ok(PushRequest {
        branch,
        commit_count,
        files_changed,
    })
}

/// `git push -u <remote> HEAD`, bounded by the git timeout.
pub async fn push_branch(
    ctx: &ExecutionContext,
    remote: &str,
    request: &PushRequest,
) -> Result<String, WorkflowError> {
    tracing::info!(branch = %request.branch, remote, "pushing");
    let out = run_git(
        &ctx.repo_root,
        &["push", "-u", remote, "HEAD"],
        ctx.git_timeout,
    )
    .await
    .map_err(|e| WorkflowError::Git(format!("push of '{}' failed: {e}", request.branch)))?;
    let mut message = format!("Pushed branch '{}' to '{remote}'.", request.branch);
    if !out.is_empty() {
        message.push('\n');
        message.push_str(&out);
    }
    Ok(message)
}
