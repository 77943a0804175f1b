//! Structural Python tooling on top of tree-sitter.

mod analysis;
mod coding;
mod pattern;

pub use analysis::{
    AnalyzePythonFileTool, FindClassesTool, FindFunctionsTool, FindImportsTool,
    FindPythonPatternTool,
};
pub use coding::{AddFunctionTool, AddImportTool};
pub use pattern::{ModifyPythonCodeTool, PatternMatch, PythonPattern};

use super::traits::{ExecutionContext, SourceFile};
use crate::error::ToolError;
use std::cell::RefCell;
use tree_sitter::{Node, Parser, Tree};

thread_local! {
    static PYTHON_PARSER: RefCell<Parser> = RefCell::new({
        let mut p = Parser::new();
        // A failure here surfaces as a parse error below.
        let _ = p.set_language(&tree_sitter_python::LANGUAGE.into());
        p
    });
}

pub(crate) fn parse_python(source: &str, label: &str) -> Result<Tree, ToolError> {
    PYTHON_PARSER
        .with(|p| p.borrow_mut().parse(source, None))
        .ok_or_else(|| ToolError::parse(label, "tree-sitter could not parse the source"))
}

/// Read a `.py` file through the plan-aware view.
pub(crate) async fn load_python(
    ctx: &ExecutionContext,
    raw: &str,
) -> Result<SourceFile, ToolError> {
    let source = ctx.read_source(raw).await?;
    if source.path.extension().and_then(|ext| ext.to_str()) != Some("py") {
        return Err(ToolError::Unsupported(format!(
            "'{}' is not a Python file",
            source.label
        )));
    }
    Ok(source)
}

pub(crate) fn node_text<'s>(node: Node<'_>, source: &'s str) -> &'s str {
    source.get(node.byte_range()).unwrap_or_default()
}

/// Every node of one of `kinds` under `root` (inclusive), in document order.
pub(crate) fn descendants_of_kind<'t>(root: Node<'t>, kinds: &[&str]) -> Vec<Node<'t>> {
    let mut found = Vec::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if kinds.contains(&node.kind()) {
            found.push(node);
        }
        let mut cursor = node.walk();
        let children: Vec<Node<'t>> = node.children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }
    found
}

pub(crate) fn definition_name<'s>(node: Node<'_>, source: &'s str) -> Option<&'s str> {
    node.child_by_field_name("name")
        .map(|name| node_text(name, source))
}

/// 1-based first and last line of a node.
pub(crate) fn line_span(node: Node<'_>) -> (usize, usize) {
    (node.start_position().row + 1, node.end_position().row + 1)
}
