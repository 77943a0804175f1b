use super::types::{ToolKind, ToolPayload, ToolSpec};
use crate::config::Config;
use crate::error::ToolError;
use std::collections::HashMap;
use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;

/// Content of a file as the current plan would leave it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StagedFile {
    Content(String),
    Deleted,
}

/// Everything a tool needs to know about where and how to run. Built once per
/// session; the staged overlay is refreshed from the plan before each call.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub repo_root: PathBuf,
    /// Planned but unapplied contents, keyed by repo-relative path.
    pub staged: HashMap<String, StagedFile>,
    pub shell_timeout: Duration,
    pub git_timeout: Duration,
    pub max_output_chars: usize,
    pub max_search_results: usize,
    pub max_directory_items: usize,
    pub branch_prefix: String,
}

impl ExecutionContext {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
            staged: HashMap::new(),
            shell_timeout: Duration::from_secs(120),
            git_timeout: Duration::from_secs(60),
            max_output_chars: 10_000,
            max_search_results: 50,
            max_directory_items: 50,
            branch_prefix: "agent-".to_string(),
        }
    }

    pub fn from_config(repo_root: impl Into<PathBuf>, config: &Config) -> Self {
        Self {
            shell_timeout: Duration::from_secs(config.tools.shell_timeout_secs),
            git_timeout: Duration::from_secs(config.tools.git_timeout_secs),
            max_output_chars: config.tools.max_output_chars,
            max_search_results: config.tools.max_search_results,
            max_directory_items: config.tools.max_directory_items,
            branch_prefix: config.workflow.branch_prefix.clone(),
            ..Self::new(repo_root)
        }
    }

    /// Resolve a tool-supplied path against the repository root.
    ///
    /// Relative paths join the root; absolute paths must already lie inside
    /// it. `..` may not climb above the root. Resolution is lexical so that
    /// not-yet-existing files can be addressed.
    pub fn resolve(&self, raw: &str) -> Result<PathBuf, ToolError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ToolError::Denied("empty path".into()));
        }
        let candidate = Path::new(raw);
        let relative = if candidate.is_absolute() {
            candidate
                .strip_prefix(&self.repo_root)
                .map_err(|_| ToolError::Denied(format!("{raw} is outside the repository")))?
                .to_path_buf()
        } else {
            candidate.to_path_buf()
        };

        let mut resolved = self.repo_root.clone();
        let mut depth = 0usize;
        for component in relative.components() {
            match component {
                Component::Normal(part) => {
                    resolved.push(part);
                    depth += 1;
                }
                Component::ParentDir => {
                    if depth == 0 {
                        return Err(ToolError::Denied(format!(
                            "{raw} escapes the repository root"
                        )));
                    }
                    resolved.pop();
                    depth -= 1;
                }
                Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
            }
        }
        Ok(resolved)
    }

    /// Repo-relative, `/`-separated label for a resolved path. The root itself is `.`.
    pub fn label(&self, resolved: &Path) -> String {
        let relative = resolved.strip_prefix(&self.repo_root).unwrap_or(resolved);
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        if parts.is_empty() {
            ".".to_string()
        } else {
            parts.join("/")
        }
    }

    /// Current content of a file: the staged version if the plan touches it,
    /// otherwise what is on disk.
    pub async fn read_source(&self, raw: &str) -> Result<SourceFile, ToolError> {
        let path = self.resolve(raw)?;
        let label = self.label(&path);
        let content = match self.staged.get(&label) {
            Some(StagedFile::Content(content)) => content.clone(),
            Some(StagedFile::Deleted) => return Err(ToolError::NotFound(label)),
            None => match tokio::fs::read_to_string(&path).await {
                Ok(content) => content,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(ToolError::NotFound(label));
                }
                Err(e) => return Err(ToolError::io(label, e)),
            },
        };
        Ok(SourceFile {
            path,
            label,
            content,
        })
    }

    /// Whether a path exists once the plan is taken into account.
    pub async fn exists(&self, raw: &str) -> Result<bool, ToolError> {
        let path = self.resolve(raw)?;
        let label = self.label(&path);
        Ok(match self.staged.get(&label) {
            Some(StagedFile::Content(_)) => true,
            Some(StagedFile::Deleted) => false,
            None => tokio::fs::try_exists(&path).await.unwrap_or(false),
        })
    }
}

/// A file read through [`ExecutionContext::read_source`].
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    pub label: String,
    pub content: String,
}

/// Core tool trait: one implementation per catalog entry.
pub trait Tool: Send + Sync {
    fn kind(&self) -> ToolKind;

    /// Tool name (used in LLM function calling)
    fn name(&self) -> &'static str {
        self.kind().as_str()
    }

    /// Human-readable description
    fn description(&self) -> &str;

    /// JSON schema for parameters
    fn parameters_schema(&self) -> serde_json::Value;

    fn execute<'a>(
        &'a self,
        args: serde_json::Value,
        ctx: &'a ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = Result<ToolPayload, ToolError>> + Send + 'a>>;

    /// Get the full spec for LLM registration
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn relative_paths_join_root() {
        let ctx = ExecutionContext::new("/repo");
        assert_eq!(
            ctx.resolve("roles/web/tasks/main.yml").unwrap(),
            PathBuf::from("/repo/roles/web/tasks/main.yml")
        );
        assert_eq!(
            ctx.resolve("./a/../b.py").unwrap(),
            PathBuf::from("/repo/b.py")
        );
    }

    #[test]
    fn escaping_paths_are_denied() {
        let ctx = ExecutionContext::new("/repo");
        assert!(matches!(
            ctx.resolve("../etc/passwd"),
            Err(ToolError::Denied(_))
        ));
        assert!(matches!(ctx.resolve("/etc/passwd"), Err(ToolError::Denied(_))));
        assert!(ctx.resolve("/repo/site.yml").is_ok());
    }

    #[test]
    fn label_is_repo_relative() {
        let ctx = ExecutionContext::new("/repo");
        assert_eq!(ctx.label(Path::new("/repo/src/app.py")), "src/app.py");
        assert_eq!(ctx.label(Path::new("/repo")), ".");
    }

    #[tokio::test]
    async fn staged_content_shadows_disk() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.py"), "disk\n").unwrap();
        let mut ctx = ExecutionContext::new(tmp.path());

        assert_eq!(ctx.read_source("a.py").await.unwrap().content, "disk\n");

        ctx.staged
            .insert("a.py".into(), StagedFile::Content("planned\n".into()));
        assert_eq!(ctx.read_source("a.py").await.unwrap().content, "planned\n");

        ctx.staged.insert("a.py".into(), StagedFile::Deleted);
        assert!(matches!(
            ctx.read_source("a.py").await,
            Err(ToolError::NotFound(_))
        ));
        assert!(!ctx.exists("a.py").await.unwrap());
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let ctx = ExecutionContext::new(tmp.path());
        assert!(matches!(
            ctx.read_source("nope.txt").await,
            Err(ToolError::NotFound(label)) if label == "nope.txt"
        ));
    }
}
