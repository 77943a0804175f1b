use super::{definition_name, descendants_of_kind, load_python, node_text, parse_python};
use crate::error::ToolError;
use crate::tools::common::{parse_args, path_property, proposal};
use crate::tools::traits::{ExecutionContext, Tool};
use crate::tools::types::{ToolKind, ToolPayload};
use crate::workflow::{ChangeKind, make_pending_change};
use serde::Deserialize;
use serde_json::{Value, json};
use std::future::Future;
use std::pin::Pin;
use tree_sitter::Node;

fn squash_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_docstring(stmt: Node<'_>) -> bool {
    stmt.kind() == "expression_statement"
        && stmt.named_child_count() == 1
        && stmt.named_child(0).is_some_and(|child| child.kind() == "string")
}

/// Line index (0-based) where a new import belongs: after the last existing
/// import, else after any leading comments and module docstring.
fn import_insert_line(root: Node<'_>) -> usize {
    let imports = descendants_of_kind(
        root,
        &["import_statement", "import_from_statement", "future_import_statement"],
    );
    if let Some(last) = imports.iter().map(|n| n.end_position().row + 1).max() {
        return last;
    }

    let mut line = 0;
    let mut cursor = root.walk();
    let mut seen_docstring = false;
    for stmt in root.named_children(&mut cursor) {
        if stmt.kind() == "comment" || (!seen_docstring && is_docstring(stmt)) {
            seen_docstring |= stmt.kind() != "comment";
            line = stmt.end_position().row + 1;
        } else {
            break;
        }
    }
    line
}

/// Insert `text` before line `index` of `source`, keeping line structure.
fn insert_at_line(source: &str, index: usize, text: &str) -> String {
    let mut lines: Vec<String> = source.split_inclusive('\n').map(str::to_string).collect();
    if index >= lines.len() {
        if let Some(last) = lines.last_mut()
            && !last.ends_with('\n')
        {
            last.push('\n');
        }
        lines.push(text.to_string());
    } else {
        lines.insert(index, text.to_string());
    }
    lines.concat()
}

// ── add_import (proposal) ───────────────────────────────────────────

#[derive(Deserialize)]
struct ImportArgs {
    path: String,
    import_stmt: String,
}

pub struct AddImportTool;

impl Tool for AddImportTool {
    fn kind(&self) -> ToolKind {
        ToolKind::AddImport
    }

    fn description(&self) -> &str {
        "Propose adding an import statement after the existing imports. Nothing is written until the user approves"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": path_property("Path to the Python file"),
                "import_stmt": { "type": "string", "description": "e.g. 'import os' or 'from typing import List'" }
            },
            "required": ["path", "import_stmt"]
        })
    }

    fn execute<'a>(
        &'a self,
        args: Value,
        ctx: &'a ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = Result<ToolPayload, ToolError>> + Send + 'a>> {
        Box::pin(async move {
            let args: ImportArgs = parse_args(self.kind(), args)?;
            let statement = args.import_stmt.trim();
            if statement.is_empty() {
                return Err(ToolError::InvalidArguments {
                    tool: self.kind().to_string(),
                    message: "import_stmt is empty".into(),
                });
            }
            let file = load_python(ctx, &args.path).await?;
            let tree = parse_python(&file.content, &file.label)?;
            let root = tree.root_node();

            let wanted = squash_whitespace(statement);
            let exists = descendants_of_kind(root, &["import_statement", "import_from_statement"])
                .into_iter()
                .any(|node| squash_whitespace(node_text(node, &file.content)) == wanted);
            if exists {
                return Err(ToolError::Command(format!(
                    "Import '{statement}' already exists in file."
                )));
            }

            let line = import_insert_line(root);
            let modified = insert_at_line(&file.content, line, &format!("{statement}\n"));
            let change = make_pending_change(
                file.label,
                file.content,
                modified,
                format!("Add import: {statement}"),
                ChangeKind::Modify,
            );
            Ok(proposal(&change, json!({})))
        })
    }
}

// ── add_function (proposal) ─────────────────────────────────────────

#[derive(Deserialize)]
struct FunctionArgs {
    path: String,
    func_code: String,
    #[serde(default)]
    after: Option<String>,
}

pub struct AddFunctionTool;

/// Name of the first function defined in `code`, if it parses.
fn new_function_name(code: &str) -> Option<String> {
    let tree = parse_python(code, "func_code").ok()?;
    descendants_of_kind(tree.root_node(), &["function_definition"])
        .first()
        .and_then(|func| definition_name(*func, code))
        .map(str::to_string)
}

impl Tool for AddFunctionTool {
    fn kind(&self) -> ToolKind {
        ToolKind::AddFunction
    }

    fn description(&self) -> &str {
        "Propose adding a function after a named function or class, or at the end of the file. \
         Nothing is written until the user approves"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": path_property("Path to the Python file"),
                "func_code": { "type": "string", "description": "Complete function source" },
                "after": { "type": "string", "description": "Function or class to insert after (default: end of file)" }
            },
            "required": ["path", "func_code"]
        })
    }

    fn execute<'a>(
        &'a self,
        args: Value,
        ctx: &'a ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = Result<ToolPayload, ToolError>> + Send + 'a>> {
        Box::pin(async move {
            let args: FunctionArgs = parse_args(self.kind(), args)?;
            let after = args.after.as_deref().map(str::trim).filter(|a| !a.is_empty());
            let file = load_python(ctx, &args.path).await?;
            let tree = parse_python(&file.content, &file.label)?;
            let root = tree.root_node();

            let line_count = file.content.split_inclusive('\n').count();
            let insert_line = match after {
                None => line_count,
                Some(anchor) => {
                    let named = |kind: &str| {
                        descendants_of_kind(root, &[kind])
                            .into_iter()
                            .find(|node| definition_name(*node, &file.content) == Some(anchor))
                    };
                    let target = named("function_definition")
                        .or_else(|| named("class_definition"))
                        .ok_or_else(|| {
                            ToolError::NoMatch(format!(
                                "Could not find function or class named '{anchor}'."
                            ))
                        })?;
                    target.end_position().row + 1
                }
            };

            let block = format!("\n\n{}\n", args.func_code.trim());
            let modified = if insert_line >= line_count {
                format!("{}{block}", file.content.trim_end())
            } else {
                insert_at_line(&file.content, insert_line, &block)
            };

            let name = new_function_name(&args.func_code)
                .unwrap_or_else(|| "new function".to_string());
            let description = match after {
                Some(anchor) => format!("Add function '{name}' after '{anchor}'"),
                None => format!("Add function '{name}' at end of file"),
            };
            let change = make_pending_change(
                file.label,
                file.content,
                modified,
                description,
                ChangeKind::Modify,
            );
            Ok(proposal(&change, json!({})))
        })
    }
}
