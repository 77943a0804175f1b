use super::common::{parse_args, path_property, proposal};
use super::traits::{ExecutionContext, Tool};
use super::types::{ToolKind, ToolPayload};
use crate::error::ToolError;
use crate::workflow::{ChangeKind, make_pending_change};
use serde::Deserialize;
use serde_json::{Value, json};
use std::future::Future;
use std::path::Path;
use std::pin::Pin;

/// Directories with this name are summarized instead of listed once they hold
/// more than [`INVENTORY_SKIP_THRESHOLD`] files.
const INVENTORY_DIR: &str = "inventories";
const INVENTORY_SKIP_THRESHOLD: usize = 30;

#[derive(Deserialize)]
struct PathArgs {
    path: String,
}

#[derive(Deserialize)]
struct ListArgs {
    path: String,
    max_items: Option<usize>,
}

#[derive(Deserialize)]
struct WriteArgs {
    path: String,
    content: String,
    #[serde(default)]
    description: Option<String>,
}

fn path_only_schema(description: &str) -> Value {
    json!({
        "type": "object",
        "properties": { "path": path_property(description) },
        "required": ["path"]
    })
}

// ── read_file ───────────────────────────────────────────────────────

pub struct ReadFileTool;

impl Tool for ReadFileTool {
    fn kind(&self) -> ToolKind {
        ToolKind::ReadFile
    }

    fn description(&self) -> &str {
        "Read the contents of a file in the repository"
    }

    fn parameters_schema(&self) -> Value {
        path_only_schema("Path to the file, relative to the repository root")
    }

    fn execute<'a>(
        &'a self,
        args: Value,
        ctx: &'a ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = Result<ToolPayload, ToolError>> + Send + 'a>> {
        Box::pin(async move {
            let args: PathArgs = parse_args(self.kind(), args)?;
            let path = ctx.resolve(&args.path)?;
            let label = ctx.label(&path);
            if path.is_dir() {
                return Err(ToolError::Command(format!("'{label}' is not a file")));
            }
            let content = match tokio::fs::read_to_string(&path).await {
                Ok(content) => content,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(ToolError::NotFound(label));
                }
                Err(e) => return Err(ToolError::io(label, e)),
            };
            if ctx.staged.contains_key(&label) {
                return Ok(ToolPayload::Text(format!(
                    "{content}\n[NOTE: '{label}' has unapplied changes in the current plan; \
                     modification tools build on the planned version]"
                )));
            }
            Ok(ToolPayload::Text(content))
        })
    }
}

// ── list_directory ──────────────────────────────────────────────────

pub struct ListDirectoryTool;

fn count_files(dir: &Path) -> usize {
    walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .count()
}

impl Tool for ListDirectoryTool {
    fn kind(&self) -> ToolKind {
        ToolKind::ListDirectory
    }

    fn description(&self) -> &str {
        "List the contents of a directory. Large inventories directories are summarized"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": path_property("Directory path, relative to the repository root"),
                "max_items": {
                    "type": "integer",
                    "description": "Maximum number of entries to return (default 50)"
                }
            },
            "required": ["path"]
        })
    }

    fn execute<'a>(
        &'a self,
        args: Value,
        ctx: &'a ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = Result<ToolPayload, ToolError>> + Send + 'a>> {
        Box::pin(async move {
            let args: ListArgs = parse_args(self.kind(), args)?;
            let max_items = args.max_items.unwrap_or(ctx.max_directory_items).max(1);
            let dir = ctx.resolve(&args.path)?;
            let label = ctx.label(&dir);
            if !dir.exists() {
                return Err(ToolError::NotFound(label));
            }
            if !dir.is_dir() {
                return Err(ToolError::Command(format!("'{label}' is not a directory")));
            }

            let mut reader = tokio::fs::read_dir(&dir)
                .await
                .map_err(|e| ToolError::io(label.clone(), e))?;
            let mut children = Vec::new();
            while let Some(entry) = reader
                .next_entry()
                .await
                .map_err(|e| ToolError::io(label.clone(), e))?
            {
                children.push(entry.path());
            }
            children.sort();

            let mut entries = Vec::new();
            let mut skipped = Vec::new();
            for child in children {
                let name = child
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let is_dir = child.is_dir();
                if is_dir && name.eq_ignore_ascii_case(INVENTORY_DIR) {
                    let files = count_files(&child);
                    if files > INVENTORY_SKIP_THRESHOLD {
                        skipped.push(format!("{name} ({files} files)"));
                        continue;
                    }
                }
                let marker = if is_dir { "[DIR]" } else { "[FILE]" };
                entries.push(format!("{marker} {name}"));
            }

            if entries.is_empty() && skipped.is_empty() {
                return Ok(ToolPayload::Text(format!("Directory '{label}' is empty.")));
            }

            let total = entries.len();
            let mut out = format!("Contents of '{label}' ({total} items):\n");
            out.push_str(&entries.iter().take(max_items).cloned().collect::<Vec<_>>().join("\n"));
            if total > max_items {
                out.push_str(&format!(
                    "\n\n[FILTERED: Showing {max_items} of {total} items. Use specific patterns to find more.]"
                ));
            }
            if !skipped.is_empty() {
                out.push_str(&format!(
                    "\n[SKIPPED large directories: {}]",
                    skipped.join(", ")
                ));
            }
            Ok(ToolPayload::Text(out))
        })
    }
}

// ── file_exists ─────────────────────────────────────────────────────

pub struct FileExistsTool;

impl Tool for FileExistsTool {
    fn kind(&self) -> ToolKind {
        ToolKind::FileExists
    }

    fn description(&self) -> &str {
        "Check whether a file or directory exists"
    }

    fn parameters_schema(&self) -> Value {
        path_only_schema("Path to check, relative to the repository root")
    }

    fn execute<'a>(
        &'a self,
        args: Value,
        ctx: &'a ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = Result<ToolPayload, ToolError>> + Send + 'a>> {
        Box::pin(async move {
            let args: PathArgs = parse_args(self.kind(), args)?;
            let path = ctx.resolve(&args.path)?;
            let label = ctx.label(&path);
            let message = match tokio::fs::metadata(&path).await {
                Ok(meta) if meta.is_dir() => format!("Path '{label}' exists and is a directory."),
                Ok(meta) if meta.is_file() => format!("Path '{label}' exists and is a file."),
                Ok(_) => format!("Path '{label}' exists but is of unknown type."),
                Err(_) => format!("Path '{label}' does not exist."),
            };
            Ok(ToolPayload::Text(message))
        })
    }
}

// ── write_file (proposal) ───────────────────────────────────────────

pub struct WriteFileTool;

impl Tool for WriteFileTool {
    fn kind(&self) -> ToolKind {
        ToolKind::WriteFile
    }

    fn description(&self) -> &str {
        "Propose writing a file (create or overwrite). Nothing is written until the user approves"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": path_property("Path to the file, relative to the repository root"),
                "content": { "type": "string", "description": "Full new content of the file" },
                "description": { "type": "string", "description": "What the change does" }
            },
            "required": ["path", "content"]
        })
    }

    fn execute<'a>(
        &'a self,
        args: Value,
        ctx: &'a ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = Result<ToolPayload, ToolError>> + Send + 'a>> {
        Box::pin(async move {
            let args: WriteArgs = parse_args(self.kind(), args)?;
            let path = ctx.resolve(&args.path)?;
            if path.is_dir() {
                return Err(ToolError::Command(format!(
                    "'{}' is a directory",
                    ctx.label(&path)
                )));
            }
            let (label, original, kind) = match ctx.read_source(&args.path).await {
                Ok(source) => (source.label, source.content, ChangeKind::Modify),
                Err(ToolError::NotFound(label)) => (label, String::new(), ChangeKind::Create),
                Err(e) => return Err(e),
            };
            let description = args.description.unwrap_or_else(|| match kind {
                ChangeKind::Create => format!("Create {label}"),
                ChangeKind::Modify | ChangeKind::Delete => format!("Rewrite {label}"),
            });
            let change = make_pending_change(label, original, args.content, description, kind);
            Ok(proposal(&change, json!({})))
        })
    }
}

// ── delete_file (proposal) ──────────────────────────────────────────

pub struct DeleteFileTool;

impl Tool for DeleteFileTool {
    fn kind(&self) -> ToolKind {
        ToolKind::DeleteFile
    }

    fn description(&self) -> &str {
        "Propose deleting a file. Nothing is removed until the user approves"
    }

    fn parameters_schema(&self) -> Value {
        path_only_schema("Path to the file, relative to the repository root")
    }

    fn execute<'a>(
        &'a self,
        args: Value,
        ctx: &'a ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = Result<ToolPayload, ToolError>> + Send + 'a>> {
        Box::pin(async move {
            let args: PathArgs = parse_args(self.kind(), args)?;
            let path = ctx.resolve(&args.path)?;
            if path.is_dir() {
                return Err(ToolError::Command(format!(
                    "'{}' is not a file",
                    ctx.label(&path)
                )));
            }
            let source = ctx.read_source(&args.path).await?;
            let description = format!("Delete {}", source.label);
            let change = make_pending_change(
                source.label,
                source.content,
                String::new(),
                description,
                ChangeKind::Delete,
            );
            Ok(proposal(&change, json!({})))
        })
    }
}
