use super::pattern::PythonPattern;
use super::{definition_name, descendants_of_kind, line_span, load_python, node_text, parse_python};
use crate::error::ToolError;
use crate::tools::common::{parse_args, path_property};
use crate::tools::traits::{ExecutionContext, Tool};
use crate::tools::types::{ToolKind, ToolPayload};
use serde::Deserialize;
use serde_json::{Value, json};
use std::future::Future;
use std::pin::Pin;
use tree_sitter::Node;

const FUNCTION_TEXT_PREVIEW: usize = 200;
const IMPORT_KINDS: &[&str] = &[
    "import_statement",
    "import_from_statement",
    "future_import_statement",
];

#[derive(Deserialize)]
struct PathArgs {
    path: String,
}

#[derive(Deserialize)]
struct PatternArgs {
    path: String,
    pattern: String,
}

fn path_schema() -> Value {
    json!({
        "type": "object",
        "properties": { "path": path_property("Path to the Python file") },
        "required": ["path"]
    })
}

fn function_text(node: Node<'_>, source: &str) -> String {
    let text = node_text(node, source);
    match text.char_indices().nth(FUNCTION_TEXT_PREVIEW) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

fn method_names(class: Node<'_>, source: &str) -> Vec<String> {
    descendants_of_kind(class, &["function_definition"])
        .into_iter()
        .filter_map(|method| definition_name(method, source))
        .map(str::to_string)
        .collect()
}

fn base_classes(class: Node<'_>, source: &str) -> Vec<String> {
    let Some(args) = class.child_by_field_name("superclasses") else {
        return Vec::new();
    };
    let mut cursor = args.walk();
    args.named_children(&mut cursor)
        .filter(|arg| matches!(arg.kind(), "identifier" | "attribute"))
        .map(|arg| node_text(arg, source).to_string())
        .collect()
}

fn import_entries(root: Node<'_>, source: &str, with_type: bool) -> Vec<Value> {
    descendants_of_kind(root, IMPORT_KINDS)
        .into_iter()
        .map(|node| {
            let mut entry = json!({
                "text": node_text(node, source),
                "line": node.start_position().row + 1,
            });
            if with_type {
                entry["type"] = json!(if node.kind() == "import_statement" {
                    "import"
                } else {
                    "from_import"
                });
            }
            entry
        })
        .collect()
}

/// Module-level `name = ...` assignments.
fn global_variables(root: Node<'_>, source: &str) -> Vec<Value> {
    let mut cursor = root.walk();
    root.named_children(&mut cursor)
        .filter(|stmt| stmt.kind() == "expression_statement")
        .filter_map(|stmt| stmt.named_child(0))
        .filter(|expr| expr.kind() == "assignment")
        .filter_map(|assign| {
            let left = assign.child_by_field_name("left")?;
            (left.kind() == "identifier").then(|| {
                json!({
                    "name": node_text(left, source),
                    "line": assign.start_position().row + 1,
                })
            })
        })
        .collect()
}

// ── analyze_python_file ─────────────────────────────────────────────

pub struct AnalyzePythonFileTool;

impl Tool for AnalyzePythonFileTool {
    fn kind(&self) -> ToolKind {
        ToolKind::AnalyzePythonFile
    }

    fn description(&self) -> &str {
        "Summarize a Python file: functions, classes with methods, imports, module-level variables, line count"
    }

    fn parameters_schema(&self) -> Value {
        path_schema()
    }

    fn execute<'a>(
        &'a self,
        args: Value,
        ctx: &'a ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = Result<ToolPayload, ToolError>> + Send + 'a>> {
        Box::pin(async move {
            let args: PathArgs = parse_args(self.kind(), args)?;
            let file = load_python(ctx, &args.path).await?;
            let src = file.content.as_str();
            let tree = parse_python(src, &file.label)?;
            let root = tree.root_node();

            let functions: Vec<Value> = descendants_of_kind(root, &["function_definition"])
                .into_iter()
                .filter_map(|func| {
                    let name = definition_name(func, src)?;
                    let (start_line, end_line) = line_span(func);
                    Some(json!({
                        "name": name,
                        "start_line": start_line,
                        "end_line": end_line,
                        "text": function_text(func, src),
                    }))
                })
                .collect();
            let classes: Vec<Value> = descendants_of_kind(root, &["class_definition"])
                .into_iter()
                .filter_map(|class| {
                    let name = definition_name(class, src)?;
                    let (start_line, end_line) = line_span(class);
                    Some(json!({
                        "name": name,
                        "start_line": start_line,
                        "end_line": end_line,
                        "methods": method_names(class, src),
                    }))
                })
                .collect();

            Ok(ToolPayload::Structured(json!({
                "file": file.label,
                "functions": functions,
                "classes": classes,
                "imports": import_entries(root, src, false),
                "global_variables": global_variables(root, src),
                "line_count": src.lines().count(),
            })))
        })
    }
}

// ── find_functions ──────────────────────────────────────────────────

pub struct FindFunctionsTool;

impl Tool for FindFunctionsTool {
    fn kind(&self) -> ToolKind {
        ToolKind::FindFunctions
    }

    fn description(&self) -> &str {
        "List function definitions (including methods) with parameters and line ranges"
    }

    fn parameters_schema(&self) -> Value {
        path_schema()
    }

    fn execute<'a>(
        &'a self,
        args: Value,
        ctx: &'a ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = Result<ToolPayload, ToolError>> + Send + 'a>> {
        Box::pin(async move {
            let args: PathArgs = parse_args(self.kind(), args)?;
            let file = load_python(ctx, &args.path).await?;
            let src = file.content.as_str();
            let tree = parse_python(src, &file.label)?;

            let functions: Vec<Value> =
                descendants_of_kind(tree.root_node(), &["function_definition"])
                    .into_iter()
                    .filter_map(|func| {
                        let name = definition_name(func, src)?;
                        let parameters = func
                            .child_by_field_name("parameters")
                            .map_or("()", |params| node_text(params, src));
                        let (start_line, end_line) = line_span(func);
                        Some(json!({
                            "name": name,
                            "parameters": parameters,
                            "start_line": start_line,
                            "end_line": end_line,
                        }))
                    })
                    .collect();
            if functions.is_empty() {
                return Ok(ToolPayload::Text("No functions found in file.".into()));
            }
            Ok(ToolPayload::Structured(Value::Array(functions)))
        })
    }
}

// ── find_classes ────────────────────────────────────────────────────

pub struct FindClassesTool;

impl Tool for FindClassesTool {
    fn kind(&self) -> ToolKind {
        ToolKind::FindClasses
    }

    fn description(&self) -> &str {
        "List class definitions with base classes, methods and line ranges"
    }

    fn parameters_schema(&self) -> Value {
        path_schema()
    }

    fn execute<'a>(
        &'a self,
        args: Value,
        ctx: &'a ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = Result<ToolPayload, ToolError>> + Send + 'a>> {
        Box::pin(async move {
            let args: PathArgs = parse_args(self.kind(), args)?;
            let file = load_python(ctx, &args.path).await?;
            let src = file.content.as_str();
            let tree = parse_python(src, &file.label)?;

            let classes: Vec<Value> = descendants_of_kind(tree.root_node(), &["class_definition"])
                .into_iter()
                .filter_map(|class| {
                    let name = definition_name(class, src)?;
                    let (start_line, end_line) = line_span(class);
                    Some(json!({
                        "name": name,
                        "bases": base_classes(class, src),
                        "methods": method_names(class, src),
                        "start_line": start_line,
                        "end_line": end_line,
                    }))
                })
                .collect();
            if classes.is_empty() {
                return Ok(ToolPayload::Text("No classes found in file.".into()));
            }
            Ok(ToolPayload::Structured(Value::Array(classes)))
        })
    }
}

// ── find_imports ────────────────────────────────────────────────────

pub struct FindImportsTool;

impl Tool for FindImportsTool {
    fn kind(&self) -> ToolKind {
        ToolKind::FindImports
    }

    fn description(&self) -> &str {
        "List import statements with their type and line"
    }

    fn parameters_schema(&self) -> Value {
        path_schema()
    }

    fn execute<'a>(
        &'a self,
        args: Value,
        ctx: &'a ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = Result<ToolPayload, ToolError>> + Send + 'a>> {
        Box::pin(async move {
            let args: PathArgs = parse_args(self.kind(), args)?;
            let file = load_python(ctx, &args.path).await?;
            let tree = parse_python(&file.content, &file.label)?;
            let imports = import_entries(tree.root_node(), &file.content, true);
            if imports.is_empty() {
                return Ok(ToolPayload::Text("No imports found in file.".into()));
            }
            Ok(ToolPayload::Structured(Value::Array(imports)))
        })
    }
}

// ── find_python_pattern ─────────────────────────────────────────────

pub struct FindPythonPatternTool;

impl Tool for FindPythonPatternTool {
    fn kind(&self) -> ToolKind {
        ToolKind::FindPythonPattern
    }

    fn description(&self) -> &str {
        "Find code matching a structural pattern. Use $NAME metavariables for any expression, \
         e.g. 'print($A)' or 'requests.get($URL, timeout=$T)'"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": path_property("Path to the Python file"),
                "pattern": { "type": "string", "description": "Structural pattern with $NAME metavariables" }
            },
            "required": ["path", "pattern"]
        })
    }

    fn execute<'a>(
        &'a self,
        args: Value,
        ctx: &'a ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = Result<ToolPayload, ToolError>> + Send + 'a>> {
        Box::pin(async move {
            let args: PatternArgs = parse_args(self.kind(), args)?;
            let file = load_python(ctx, &args.path).await?;
            let pattern = PythonPattern::compile(&args.pattern)?;
            let matches = pattern.find_all(&file.content, &file.label)?;
            if matches.is_empty() {
                return Ok(ToolPayload::Text(format!(
                    "No matches found for pattern: {}",
                    args.pattern
                )));
            }
            let results: Vec<Value> = matches
                .iter()
                .map(|m| {
                    json!({
                        "text": &file.content[m.byte_range.clone()],
                        "start_line": m.start.0,
                        "end_line": m.end.0,
                        "start_col": m.start.1,
                        "end_col": m.end.1,
                    })
                })
                .collect();
            Ok(ToolPayload::Structured(Value::Array(results)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#""""Utilities."""
import os
from typing import List

LIMIT = 10


def foo(a, b=2):
    return a + b


class Greeter(Base, mixins.Loud):
    def __init__(self, name):
        self.name = name

    def greet(self):
        print(f"hi {self.name}")
"#;

    fn ctx_with_sample() -> (TempDir, ExecutionContext) {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("utils.py"), SAMPLE).unwrap();
        let ctx = ExecutionContext::new(tmp.path());
        (tmp, ctx)
    }

    fn structured(payload: ToolPayload) -> Value {
        match payload {
            ToolPayload::Structured(value) => value,
            ToolPayload::Text(text) => panic!("expected structured output, got {text}"),
        }
    }

    #[tokio::test]
    async fn analyze_reports_structure() {
        let (_tmp, ctx) = ctx_with_sample();
        let out = structured(
            AnalyzePythonFileTool
                .execute(json!({"path": "utils.py"}), &ctx)
                .await
                .unwrap(),
        );
        let functions: Vec<&str> = out["functions"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["name"].as_str().unwrap())
            .collect();
        assert_eq!(functions, ["foo", "__init__", "greet"]);
        assert_eq!(out["functions"][0]["start_line"], 8);
        assert_eq!(out["functions"][0]["end_line"], 9);
        assert_eq!(out["classes"][0]["methods"], json!(["__init__", "greet"]));
        assert_eq!(out["imports"].as_array().unwrap().len(), 2);
        assert_eq!(out["global_variables"], json!([{"name": "LIMIT", "line": 5}]));
        assert_eq!(out["line_count"], 17);
    }

    #[tokio::test]
    async fn find_functions_includes_parameters() {
        let (_tmp, ctx) = ctx_with_sample();
        let out = structured(
            FindFunctionsTool
                .execute(json!({"path": "utils.py"}), &ctx)
                .await
                .unwrap(),
        );
        assert_eq!(out[0]["parameters"], "(a, b=2)");
        assert_eq!(out[2]["name"], "greet");
    }

    #[tokio::test]
    async fn find_classes_lists_bases() {
        let (_tmp, ctx) = ctx_with_sample();
        let out = structured(
            FindClassesTool
                .execute(json!({"path": "utils.py"}), &ctx)
                .await
                .unwrap(),
        );
        assert_eq!(out[0]["bases"], json!(["Base", "mixins.Loud"]));
        assert_eq!(out[0]["start_line"], 12);
    }

    #[tokio::test]
    async fn find_imports_types_each_statement() {
        let (_tmp, ctx) = ctx_with_sample();
        let out = structured(
            FindImportsTool
                .execute(json!({"path": "utils.py"}), &ctx)
                .await
                .unwrap(),
        );
        assert_eq!(out[0], json!({"type": "import", "text": "import os", "line": 2}));
        assert_eq!(out[1]["type"], "from_import");
    }

    #[tokio::test]
    async fn find_pattern_reports_locations() {
        let (_tmp, ctx) = ctx_with_sample();
        let out = structured(
            FindPythonPatternTool
                .execute(json!({"path": "utils.py", "pattern": "print($A)"}), &ctx)
                .await
                .unwrap(),
        );
        assert_eq!(out[0]["text"], "print(f\"hi {self.name}\")");
        assert_eq!(out[0]["start_line"], 17);
        assert_eq!(out[0]["start_col"], 8);

        let none = FindPythonPatternTool
            .execute(json!({"path": "utils.py", "pattern": "len($X)"}), &ctx)
            .await
            .unwrap();
        assert_eq!(none.render(), "No matches found for pattern: len($X)");
    }

    #[tokio::test]
    async fn empty_results_and_non_python_files() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("empty.py"), "x = 1\n").unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "def f(): pass\n").unwrap();
        let ctx = ExecutionContext::new(tmp.path());

        let out = FindClassesTool
            .execute(json!({"path": "empty.py"}), &ctx)
            .await
            .unwrap();
        assert_eq!(out.render(), "No classes found in file.");

        let err = FindFunctionsTool
            .execute(json!({"path": "notes.txt"}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Unsupported(_)));
    }
}
