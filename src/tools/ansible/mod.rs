//! Ansible content analysis and YAML proposal tools.

mod analysis;
mod coding;

pub use analysis::{
    AnalyzePlaybookTool, AnalyzeRoleTool, FindTasksUsingModuleTool, GetVariableUsageTool,
    ScanAnsibleProjectTool,
};
pub use coding::{AddTaskTool, ModifyTaskTool, ModifyVariableTool, ModifyYamlFileTool};

use super::search::walk_files;
use super::traits::{ExecutionContext, SourceFile};
use crate::error::ToolError;
use globset::{Glob, GlobMatcher};
use serde_yaml_ng::{Mapping, Value as Yaml};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Task keys that are not the module invocation.
const TASK_KEYWORDS: &[&str] = &[
    "name",
    "when",
    "register",
    "loop",
    "loop_control",
    "with_items",
    "with_dict",
    "become",
    "become_user",
    "tags",
    "notify",
    "listen",
    "vars",
    "args",
    "environment",
    "ignore_errors",
    "changed_when",
    "failed_when",
    "delegate_to",
    "run_once",
    "no_log",
    "until",
    "retries",
    "delay",
    "check_mode",
];

const BUILTIN_PREFIX: &str = "ansible.builtin.";

static YAML_FILE: LazyLock<GlobMatcher> = LazyLock::new(|| {
    Glob::new("*.{yml,yaml}")
        .expect("valid glob")
        .compile_matcher()
});

pub(crate) fn is_yaml_path(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yml" | "yaml")
    )
}

pub(crate) fn parse_yaml(source: &SourceFile) -> Result<Yaml, ToolError> {
    serde_yaml_ng::from_str(&source.content)
        .map_err(|e| ToolError::parse(source.label.clone(), format!("YAML parsing error: {e}")))
}

/// Read and parse a YAML file through the plan-aware view.
pub(crate) async fn load_yaml(
    ctx: &ExecutionContext,
    raw: &str,
) -> Result<(SourceFile, Yaml), ToolError> {
    let source = ctx.read_source(raw).await?;
    if !is_yaml_path(&source.path) {
        return Err(ToolError::Unsupported(format!(
            "'{}' is not a YAML file",
            source.label
        )));
    }
    let yaml = parse_yaml(&source)?;
    Ok((source, yaml))
}

/// YAML files under a directory, or the file itself.
pub(crate) fn yaml_files_under(path: &Path) -> Vec<PathBuf> {
    if path.is_file() {
        return vec![path.to_path_buf()];
    }
    walk_files(path, &YAML_FILE).collect()
}

/// Parse every YAML file under `raw`, skipping files that do not parse.
pub(crate) async fn load_yaml_tree(
    ctx: &ExecutionContext,
    raw: &str,
) -> Result<Vec<(SourceFile, Yaml)>, ToolError> {
    let root = ctx.resolve(raw)?;
    if !root.exists() {
        return Err(ToolError::NotFound(ctx.label(&root)));
    }
    let mut parsed = Vec::new();
    for path in yaml_files_under(&root) {
        let label = ctx.label(&path);
        let Ok(source) = ctx.read_source(&label).await else {
            continue;
        };
        match parse_yaml(&source) {
            Ok(yaml) => parsed.push((source, yaml)),
            Err(e) => tracing::debug!(file = %label, error = %e, "skipping unparsable YAML"),
        }
    }
    Ok(parsed)
}

pub(crate) fn str_field<'a>(map: &'a Mapping, key: &str) -> Option<&'a str> {
    map.get(key).and_then(Yaml::as_str)
}

/// The module a task invokes: its first key that is not a task keyword.
pub(crate) fn task_module(task: &Mapping) -> Option<String> {
    task.keys()
        .filter_map(Yaml::as_str)
        .find(|key| !TASK_KEYWORDS.contains(key))
        .map(str::to_string)
}

/// Whether `key` names `module`, with or without the builtin collection prefix.
pub(crate) fn module_matches(key: &str, module: &str) -> bool {
    let bare = |name: &str| name.strip_prefix(BUILTIN_PREFIX).unwrap_or(name).to_string();
    key == module || bare(key) == bare(module)
}

/// A mapping looks like a play when it targets hosts or imports a playbook.
pub(crate) fn is_play(item: &Mapping) -> bool {
    item.contains_key("hosts") || item.contains_key("import_playbook")
}

pub(crate) fn is_playbook(doc: &Yaml) -> bool {
    doc.as_sequence().is_some_and(|items| {
        !items.is_empty()
            && items
                .iter()
                .filter_map(Yaml::as_mapping)
                .any(is_play)
    })
}

pub(crate) fn to_json(value: &Yaml) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}

pub(crate) fn from_json(value: &serde_json::Value) -> Result<Yaml, ToolError> {
    serde_yaml_ng::to_value(value).map_err(|e| ToolError::InvalidArguments {
        tool: "yaml".into(),
        message: e.to_string(),
    })
}

pub(crate) fn render_yaml(label: &str, value: &Yaml) -> Result<String, ToolError> {
    serde_yaml_ng::to_string(value).map_err(|e| ToolError::parse(label, e))
}

/// Short human form of a YAML scalar for descriptions.
pub(crate) fn display_value(value: &Yaml) -> String {
    match value {
        Yaml::Null => "null".to_string(),
        Yaml::Bool(b) => b.to_string(),
        Yaml::Number(n) => n.to_string(),
        Yaml::String(s) => s.clone(),
        other => serde_yaml_ng::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_else(|_| format!("{other:?}")),
    }
}
