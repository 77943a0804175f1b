use super::common::{compile_glob, parse_args};
use super::traits::{ExecutionContext, Tool};
use super::types::{ToolKind, ToolPayload};
use crate::error::ToolError;
use globset::GlobMatcher;
use regex::Regex;
use serde::Deserialize;
use serde_json::{Value, json};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use walkdir::{DirEntry, WalkDir};

/// Directories never worth descending into.
const SKIP_DIRS: &[&str] = &[".git", "node_modules", "__pycache__", ".venv", "target"];

fn is_skipped(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| SKIP_DIRS.contains(&name))
}

/// Files under `root` whose name matches `name_pattern`, in walk order.
pub(crate) fn walk_files(
    root: &Path,
    name_pattern: &GlobMatcher,
) -> impl Iterator<Item = PathBuf> {
    let name_pattern = name_pattern.clone();
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_skipped(entry))
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(move |entry| {
            name_pattern.is_match(entry.file_name())
        })
        .map(DirEntry::into_path)
}

fn search_root(ctx: &ExecutionContext, directory: Option<&str>) -> Result<PathBuf, ToolError> {
    let dir = match directory.map(str::trim) {
        Some(dir) if !dir.is_empty() => ctx.resolve(dir)?,
        _ => ctx.repo_root.clone(),
    };
    if !dir.is_dir() {
        return Err(ToolError::NotFound(ctx.label(&dir)));
    }
    Ok(dir)
}

// ── find_files ──────────────────────────────────────────────────────

#[derive(Deserialize)]
struct FindArgs {
    pattern: String,
    #[serde(default)]
    directory: Option<String>,
    #[serde(default)]
    max_results: Option<usize>,
}

pub struct FindFilesTool;

impl Tool for FindFilesTool {
    fn kind(&self) -> ToolKind {
        ToolKind::FindFiles
    }

    fn description(&self) -> &str {
        "Find files whose name matches a glob pattern (e.g. '*.yml', 'playbook*')"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": { "type": "string", "description": "File name glob" },
                "directory": { "type": "string", "description": "Directory to search (default: repository root)" },
                "max_results": { "type": "integer", "description": "Maximum results (default 50)" }
            },
            "required": ["pattern"]
        })
    }

    fn execute<'a>(
        &'a self,
        args: Value,
        ctx: &'a ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = Result<ToolPayload, ToolError>> + Send + 'a>> {
        Box::pin(async move {
            let args: FindArgs = parse_args(self.kind(), args)?;
            let max_results = args.max_results.unwrap_or(ctx.max_search_results).max(1);
            let root = search_root(ctx, args.directory.as_deref())?;
            let matcher = compile_glob(&args.pattern)?;

            let files: Vec<String> = walk_files(&root, &matcher)
                .take(max_results)
                .map(|path| ctx.label(&path))
                .collect();
            if files.is_empty() {
                return Ok(ToolPayload::Text(format!(
                    "No files found matching pattern '{}' in '{}'",
                    args.pattern,
                    ctx.label(&root)
                )));
            }

            let mut out = format!(
                "Found {} file(s) matching '{}':\n{}",
                files.len(),
                args.pattern,
                files.join("\n")
            );
            if files.len() >= max_results {
                out.push_str(&format!(
                    "\n\n[FILTERED: Results limited to {max_results}. Use a more specific pattern to narrow results.]"
                ));
            }
            Ok(ToolPayload::Text(out))
        })
    }
}

// ── search_in_files ─────────────────────────────────────────────────

#[derive(Deserialize)]
struct SearchArgs {
    search_term: String,
    #[serde(default)]
    file_pattern: Option<String>,
    #[serde(default)]
    directory: Option<String>,
    #[serde(default)]
    regex: bool,
}

pub struct SearchInFilesTool;

impl Tool for SearchInFilesTool {
    fn kind(&self) -> ToolKind {
        ToolKind::SearchInFiles
    }

    fn description(&self) -> &str {
        "Search file contents for a term. Returns path:line:text for each match"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "search_term": { "type": "string", "description": "Text to search for" },
                "file_pattern": { "type": "string", "description": "File name glob to restrict the search (default '*')" },
                "directory": { "type": "string", "description": "Directory to search (default: repository root)" },
                "regex": { "type": "boolean", "description": "Treat search_term as a regular expression" }
            },
            "required": ["search_term"]
        })
    }

    fn execute<'a>(
        &'a self,
        args: Value,
        ctx: &'a ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = Result<ToolPayload, ToolError>> + Send + 'a>> {
        Box::pin(async move {
            let args: SearchArgs = parse_args(self.kind(), args)?;
            let file_pattern = args.file_pattern.as_deref().unwrap_or("*");
            let root = search_root(ctx, args.directory.as_deref())?;
            let files = compile_glob(file_pattern)?;
            let term = if args.regex {
                args.search_term.clone()
            } else {
                regex::escape(&args.search_term)
            };
            let matcher = Regex::new(&term).map_err(|e| ToolError::InvalidArguments {
                tool: self.kind().to_string(),
                message: e.to_string(),
            })?;

            let limit = ctx.max_search_results.max(1);
            let mut matches = Vec::new();
            'files: for path in walk_files(&root, &files) {
                // Binary and non-UTF-8 files are skipped.
                let Ok(content) = std::fs::read_to_string(&path) else {
                    continue;
                };
                let label = ctx.label(&path);
                for (idx, line) in content.lines().enumerate() {
                    if matcher.is_match(line) {
                        matches.push(format!("{label}:{}:{line}", idx + 1));
                        if matches.len() >= limit {
                            break 'files;
                        }
                    }
                }
            }

            if matches.is_empty() {
                return Ok(ToolPayload::Text(format!(
                    "No matches found for '{}' in {file_pattern} files",
                    args.search_term
                )));
            }
            let mut out = format!(
                "Found {} match(es) for '{}':\n{}",
                matches.len(),
                args.search_term,
                matches.join("\n")
            );
            if matches.len() >= limit {
                out.push_str(&format!(
                    "\n\n[FILTERED: Results limited to {limit} matches. Use a more specific search term or file pattern.]"
                ));
            }
            Ok(ToolPayload::Text(out))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fixture() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("roles/web/tasks")).unwrap();
        std::fs::create_dir_all(root.join(".git")).unwrap();
        std::fs::write(root.join("site.yml"), "- hosts: all\n  roles: [web]\n").unwrap();
        std::fs::write(
            root.join("roles/web/tasks/main.yml"),
            "- name: install nginx\n  apt: name=nginx\n",
        )
        .unwrap();
        std::fs::write(root.join("app.py"), "import os\nprint(os.name)\n").unwrap();
        std::fs::write(root.join(".git/config.yml"), "hidden: true\n").unwrap();
        std::fs::write(root.join("]notes.md"), "odd name\n").unwrap();
        tmp
    }

    async fn run<T: Tool>(tool: T, args: Value, ctx: &ExecutionContext) -> String {
        tool.execute(args, ctx).await.unwrap().render()
    }

    #[tokio::test]
    async fn find_files_matches_names_recursively() {
        let tmp = fixture();
        let ctx = ExecutionContext::new(tmp.path());
        let out = run(FindFilesTool, json!({"pattern": "*.yml"}), &ctx).await;
        assert_eq!(
            out,
            "Found 2 file(s) matching '*.yml':\nroles/web/tasks/main.yml\nsite.yml"
        );
    }

    #[tokio::test]
    async fn find_files_reports_limit_and_empty() {
        let tmp = fixture();
        let ctx = ExecutionContext::new(tmp.path());
        let out = run(FindFilesTool, json!({"pattern": "*", "max_results": 1}), &ctx).await;
        assert!(out.contains("[FILTERED: Results limited to 1."));

        let out = run(FindFilesTool, json!({"pattern": "*.rs"}), &ctx).await;
        assert_eq!(out, "No files found matching pattern '*.rs' in '.'");
    }

    #[tokio::test]
    async fn find_files_accepts_bracket_classes() {
        let tmp = fixture();
        let ctx = ExecutionContext::new(tmp.path());
        let out = run(FindFilesTool, json!({"pattern": "[]x]*.md"}), &ctx).await;
        assert_eq!(out, "Found 1 file(s) matching '[]x]*.md':\n]notes.md");

        let out = run(FindFilesTool, json!({"pattern": "*.{yml,py}"}), &ctx).await;
        assert!(out.starts_with("Found 3 file(s)"));

        let err = FindFilesTool
            .execute(json!({"pattern": "[oops"}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }

    #[tokio::test]
    async fn search_in_files_reports_locations() {
        let tmp = fixture();
        let ctx = ExecutionContext::new(tmp.path());
        let out = run(
            SearchInFilesTool,
            json!({"search_term": "nginx", "file_pattern": "*.yml"}),
            &ctx,
        )
        .await;
        assert_eq!(
            out,
            "Found 2 match(es) for 'nginx':\n\
             roles/web/tasks/main.yml:1:- name: install nginx\n\
             roles/web/tasks/main.yml:2:  apt: name=nginx"
        );
    }

    #[tokio::test]
    async fn search_term_is_literal_unless_regex() {
        let tmp = fixture();
        let ctx = ExecutionContext::new(tmp.path());
        let literal = run(SearchInFilesTool, json!({"search_term": "os.name)"}), &ctx).await;
        assert!(literal.contains("app.py:2:"));

        let regex = run(
            SearchInFilesTool,
            json!({"search_term": "^import \\w+$", "regex": true}),
            &ctx,
        )
        .await;
        assert!(regex.contains("app.py:1:import os"));

        let none = run(SearchInFilesTool, json!({"search_term": "hidden"}), &ctx).await;
        assert_eq!(none, "No matches found for 'hidden' in * files");
    }
}
