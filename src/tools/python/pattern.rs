use super::{load_python, node_text, parse_python};
use crate::error::ToolError;
use crate::tools::common::{parse_args, path_property, proposal};
use crate::tools::traits::{ExecutionContext, Tool};
use crate::tools::types::{ToolKind, ToolPayload};
use crate::workflow::{ChangeKind, make_pending_change};
use regex::{Captures, Regex};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::future::Future;
use std::ops::Range;
use std::pin::Pin;
use std::sync::LazyLock;
use tree_sitter::Node;

/// Placeholder identifier a `$NAME` metavariable is rewritten to before the
/// pattern is parsed as Python.
const MV_PREFIX: &str = "__mv_";
const WILDCARD: &str = "_";

static METAVAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$([A-Z_][A-Z0-9_]*)").expect("valid regex"));

/// A compiled structural pattern such as `print($A)`.
///
/// `$NAME` matches any single node; a name used twice must match equal text.
/// `$_` matches anything without binding. Comments are ignored on both sides.
#[derive(Debug, Clone)]
pub struct PythonPattern {
    source: String,
    text: String,
}

/// One non-overlapping match. Lines are 1-based, columns 0-based bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternMatch {
    pub byte_range: Range<usize>,
    pub start: (usize, usize),
    pub end: (usize, usize),
    pub bindings: HashMap<String, String>,
}

/// Unwrap `module` and `expression_statement` wrappers around a single child.
fn pattern_root(mut node: Node<'_>) -> Node<'_> {
    while matches!(node.kind(), "module" | "expression_statement") && node.named_child_count() == 1
    {
        let Some(child) = node.named_child(0) else {
            break;
        };
        node = child;
    }
    node
}

fn significant_children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.children(&mut cursor)
        .filter(|child| child.kind() != "comment")
        .collect()
}

impl PythonPattern {
    pub fn compile(pattern: &str) -> Result<Self, ToolError> {
        let source = METAVAR
            .replace_all(pattern.trim(), |caps: &Captures| format!("{MV_PREFIX}{}", &caps[1]))
            .into_owned();
        let tree = parse_python(&source, "pattern")?;
        let invalid = |message: &str| ToolError::InvalidArguments {
            tool: "pattern".into(),
            message: format!("'{pattern}' {message}"),
        };
        if tree.root_node().has_error() {
            return Err(invalid("is not valid Python"));
        }
        if tree.root_node().named_child_count() != 1 {
            return Err(invalid("must be a single expression or statement"));
        }
        Ok(Self {
            source,
            text: pattern.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// All non-overlapping matches in document order.
    pub fn find_all(&self, target: &str, label: &str) -> Result<Vec<PatternMatch>, ToolError> {
        let pattern_tree = parse_python(&self.source, "pattern")?;
        let pattern = pattern_root(pattern_tree.root_node());
        let target_tree = parse_python(target, label)?;

        let mut matches = Vec::new();
        let mut stack = vec![target_tree.root_node()];
        while let Some(node) = stack.pop() {
            let mut bindings = HashMap::new();
            if self.match_node(pattern, node, target, &mut bindings) {
                matches.push(PatternMatch {
                    byte_range: node.byte_range(),
                    start: (node.start_position().row + 1, node.start_position().column),
                    end: (node.end_position().row + 1, node.end_position().column),
                    bindings,
                });
                continue;
            }
            let mut cursor = node.walk();
            let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
            stack.extend(children.into_iter().rev());
        }
        Ok(matches)
    }

    fn match_node(
        &self,
        pattern: Node<'_>,
        target: Node<'_>,
        target_src: &str,
        bindings: &mut HashMap<String, String>,
    ) -> bool {
        let pattern_text = node_text(pattern, &self.source);
        if pattern.kind() == "identifier" {
            if let Some(name) = pattern_text.strip_prefix(MV_PREFIX) {
                if !target.is_named() || target.kind() == "comment" {
                    return false;
                }
                if name == WILDCARD {
                    return true;
                }
                let text = node_text(target, target_src);
                return match bindings.get(name) {
                    Some(bound) => bound == text,
                    None => {
                        bindings.insert(name.to_string(), text.to_string());
                        true
                    }
                };
            }
        }

        if pattern.kind() != target.kind() {
            return false;
        }
        let pattern_children = significant_children(pattern);
        let target_children = significant_children(target);
        if pattern_children.is_empty() {
            return target_children.is_empty() && pattern_text == node_text(target, target_src);
        }
        pattern_children.len() == target_children.len()
            && pattern_children
                .into_iter()
                .zip(target_children)
                .all(|(p, t)| self.match_node(p, t, target_src, bindings))
    }
}

impl PatternMatch {
    /// Expand `$NAME` references in `template` with this match's bindings.
    /// Unbound names are left as written.
    pub fn expand(&self, template: &str) -> String {
        METAVAR
            .replace_all(template, |caps: &Captures| {
                self.bindings
                    .get(&caps[1])
                    .cloned()
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }
}

/// Replace every match of `pattern` in `source` with the expanded replacement.
pub(crate) fn rewrite(source: &str, matches: &[PatternMatch], replacement: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut cursor = 0;
    for m in matches {
        out.push_str(&source[cursor..m.byte_range.start]);
        out.push_str(&m.expand(replacement));
        cursor = m.byte_range.end;
    }
    out.push_str(&source[cursor..]);
    out
}

// ── modify_python_code (proposal) ───────────────────────────────────

#[derive(Deserialize)]
struct ModifyArgs {
    path: String,
    pattern: String,
    replacement: String,
}

pub struct ModifyPythonCodeTool;

impl Tool for ModifyPythonCodeTool {
    fn kind(&self) -> ToolKind {
        ToolKind::ModifyPythonCode
    }

    fn description(&self) -> &str {
        "Propose replacing every match of a structural pattern. The replacement may reuse \
         metavariables, e.g. pattern 'foo($A)' with replacement 'bar($A)'. Nothing is written \
         until the user approves"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": path_property("Path to the Python file"),
                "pattern": { "type": "string", "description": "Structural pattern with $NAME metavariables" },
                "replacement": { "type": "string", "description": "Replacement text; $NAME expands to the captured code" }
            },
            "required": ["path", "pattern", "replacement"]
        })
    }

    fn execute<'a>(
        &'a self,
        args: Value,
        ctx: &'a ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = Result<ToolPayload, ToolError>> + Send + 'a>> {
        Box::pin(async move {
            let args: ModifyArgs = parse_args(self.kind(), args)?;
            let file = load_python(ctx, &args.path).await?;
            let pattern = PythonPattern::compile(&args.pattern)?;
            let matches = pattern.find_all(&file.content, &file.label)?;
            if matches.is_empty() {
                return Err(ToolError::NoMatch(format!(
                    "No matches found for pattern: {}",
                    pattern.as_str()
                )));
            }

            let modified = rewrite(&file.content, &matches, &args.replacement);
            let description = format!(
                "Replace {} occurrence(s) of '{}' with '{}'",
                matches.len(),
                args.pattern,
                args.replacement
            );
            let change = make_pending_change(
                file.label,
                file.content,
                modified,
                description,
                ChangeKind::Modify,
            );
            Ok(proposal(&change, json!({ "match_count": matches.len() })))
        })
    }
}
