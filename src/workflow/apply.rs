use super::pending::{ChangeKind, PendingChange};
use std::fmt::Write as _;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyStatus {
    Applied,
    /// The file changed on disk since the change was proposed.
    Conflict,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOutcome {
    pub path: String,
    pub kind: ChangeKind,
    pub status: ApplyStatus,
}

/// Per-file result of writing an approved plan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub outcomes: Vec<FileOutcome>,
}

impl ApplyReport {
    pub fn applied(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == ApplyStatus::Applied)
            .count()
    }

    pub fn all_applied(&self) -> bool {
        self.applied() == self.outcomes.len()
    }

    /// Summary for the transcript and the terminal.
    pub fn render(&self) -> String {
        let mut out = format!(
            "Applied {}/{} approved change(s).",
            self.applied(),
            self.outcomes.len()
        );
        for outcome in &self.outcomes {
            let status = match &outcome.status {
                ApplyStatus::Applied => "applied".to_string(),
                ApplyStatus::Conflict => {
                    "CONFLICT: file changed on disk since the proposal; skipped".to_string()
                }
                ApplyStatus::Failed(reason) => format!("FAILED: {reason}"),
            };
            let _ = write!(out, "\n  {} {}: {status}", outcome.kind, outcome.path);
        }
        out
    }
}

async fn apply_one(repo_root: &Path, change: &PendingChange) -> ApplyStatus {
    let path = repo_root.join(&change.target_path);
    let failed = |e: std::io::Error| ApplyStatus::Failed(e.to_string());

    match change.change_kind {
        ChangeKind::Modify => {
            match tokio::fs::read_to_string(&path).await {
                Ok(current) if current == change.original_content => {}
                Ok(_) => return ApplyStatus::Conflict,
                Err(e) => return failed(e),
            }
            match tokio::fs::write(&path, &change.new_content).await {
                Ok(()) => ApplyStatus::Applied,
                Err(e) => failed(e),
            }
        }
        ChangeKind::Create => {
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return ApplyStatus::Conflict;
            }
            if let Some(parent) = path.parent()
                && let Err(e) = tokio::fs::create_dir_all(parent).await
            {
                return failed(e);
            }
            match tokio::fs::write(&path, &change.new_content).await {
                Ok(()) => ApplyStatus::Applied,
                Err(e) => failed(e),
            }
        }
        ChangeKind::Delete => match tokio::fs::remove_file(&path).await {
            Ok(()) => ApplyStatus::Applied,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                ApplyStatus::Failed("file no longer exists".into())
            }
            Err(e) => failed(e),
        },
    }
}

/// Write approved changes in plan order. A failing file never stops the rest.
pub async fn apply_plan(repo_root: &Path, changes: &[PendingChange]) -> ApplyReport {
    let mut report = ApplyReport::default();
    for change in changes {
        let status = apply_one(repo_root, change).await;
        match &status {
            ApplyStatus::Applied => {
                tracing::info!(file = %change.target_path, kind = %change.change_kind, "applied");
            }
            other => {
                tracing::warn!(file = %change.target_path, status = ?other, "change not applied");
            }
        }
        report.outcomes.push(FileOutcome {
            path: change.target_path.clone(),
            kind: change.change_kind,
            status,
        });
    }
    report
}
