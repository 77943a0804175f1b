use super::types::{ToolKind, ToolPayload};
use crate::error::ToolError;
use crate::workflow::PendingChange;
use globset::{GlobBuilder, GlobMatcher};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

pub(crate) fn path_property(description: &str) -> Value {
    json!({
        "type": "string",
        "description": description
    })
}

/// Deserialize tool arguments into a typed struct.
pub(crate) fn parse_args<T: DeserializeOwned>(kind: ToolKind, args: Value) -> Result<T, ToolError> {
    serde_json::from_value(args).map_err(|e| ToolError::InvalidArguments {
        tool: kind.as_str().to_string(),
        message: e.to_string(),
    })
}

/// Cut `text` to at most `limit` characters, appending a marker with the
/// original length when anything was dropped.
pub(crate) fn truncate_output(text: &str, limit: usize) -> String {
    let total = text.chars().count();
    if total <= limit {
        return text.to_string();
    }
    let kept: String = text.chars().take(limit).collect();
    format!("{kept}\n\n... (output truncated, {total} total chars)")
}

/// Plain prefix truncation on a char boundary, used for log lines and previews.
pub(crate) fn preview(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Compile a shell-style file name glob (`*.py`, `main.y?ml`, `*.{yml,yaml}`).
/// `*` never crosses a path separator.
pub(crate) fn compile_glob(pattern: &str) -> Result<GlobMatcher, ToolError> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map(|glob| glob.compile_matcher())
        .map_err(|e| ToolError::InvalidArguments {
            tool: "glob".into(),
            message: format!("invalid glob pattern '{pattern}': {e}"),
        })
}

/// Wrap a pending change as a structured tool payload, merging `extra` keys
/// (match counts, old values) alongside the change fields.
pub(crate) fn proposal(change: &PendingChange, extra: Value) -> ToolPayload {
    let mut value = change.to_value();
    if let (Some(target), Value::Object(extra)) = (value.as_object_mut(), extra) {
        for (key, field) in extra {
            target.entry(key).or_insert(field);
        }
    }
    ToolPayload::Structured(value)
}
