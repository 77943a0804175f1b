use super::{display_value, from_json, is_play, load_yaml, render_yaml, str_field, to_json};
use crate::error::ToolError;
use crate::tools::common::{parse_args, path_property, proposal};
use crate::tools::traits::{ExecutionContext, SourceFile, Tool};
use crate::tools::types::{ToolKind, ToolPayload};
use crate::workflow::{ChangeKind, make_pending_change};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use serde_yaml_ng::{Mapping, Value as Yaml};
use std::future::Future;
use std::pin::Pin;

fn invalid(kind: ToolKind, message: impl Into<String>) -> ToolError {
    ToolError::InvalidArguments {
        tool: kind.to_string(),
        message: message.into(),
    }
}

/// Build the proposal for a rewritten YAML document.
fn yaml_proposal(
    source: SourceFile,
    doc: &Yaml,
    description: String,
    extra: Value,
) -> Result<ToolPayload, ToolError> {
    let modified = render_yaml(&source.label, doc)?;
    let change = make_pending_change(
        source.label,
        source.content,
        modified,
        description,
        ChangeKind::Modify,
    );
    Ok(proposal(&change, extra))
}

fn named<'a>(tasks: &'a mut Yaml, name: &str) -> Option<&'a mut Mapping> {
    tasks
        .as_sequence_mut()?
        .iter_mut()
        .filter_map(Yaml::as_mapping_mut)
        .find(|task| str_field(task, "name") == Some(name))
}

// ── modify_task (proposal) ──────────────────────────────────────────

#[derive(Deserialize)]
struct ModifyTaskArgs {
    path: String,
    task_name: String,
    new_spec: Map<String, Value>,
}

pub struct ModifyTaskTool;

/// Locate a named task in a playbook's tasks/handlers or in a task list.
fn find_task<'a>(doc: &'a mut Yaml, name: &str) -> Option<&'a mut Mapping> {
    let playbook = doc
        .as_sequence()
        .is_some_and(|items| items.iter().filter_map(Yaml::as_mapping).any(is_play));
    if !playbook {
        return named(doc, name);
    }
    for play in doc.as_sequence_mut()?.iter_mut() {
        let Some(play) = play.as_mapping_mut() else {
            continue;
        };
        for section in ["tasks", "handlers"] {
            let hit = play
                .get(section)
                .and_then(Yaml::as_sequence)
                .is_some_and(|tasks| {
                    tasks
                        .iter()
                        .filter_map(Yaml::as_mapping)
                        .any(|task| str_field(task, "name") == Some(name))
                });
            if hit {
                return play.get_mut(section).and_then(|tasks| named(tasks, name));
            }
        }
    }
    None
}

impl Tool for ModifyTaskTool {
    fn kind(&self) -> ToolKind {
        ToolKind::ModifyTask
    }

    fn description(&self) -> &str {
        "Propose changing a named task: keys in new_spec replace or extend the task's keys. \
         Nothing is written until the user approves"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": path_property("Playbook or task file"),
                "task_name": { "type": "string", "description": "Exact 'name' of the task" },
                "new_spec": { "type": "object", "description": "Keys to set on the task" }
            },
            "required": ["path", "task_name", "new_spec"]
        })
    }

    fn execute<'a>(
        &'a self,
        args: Value,
        ctx: &'a ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = Result<ToolPayload, ToolError>> + Send + 'a>> {
        Box::pin(async move {
            let args: ModifyTaskArgs = parse_args(self.kind(), args)?;
            let (source, mut doc) = load_yaml(ctx, &args.path).await?;
            let task = find_task(&mut doc, &args.task_name).ok_or_else(|| {
                ToolError::NoMatch(format!("Task '{}' not found in file.", args.task_name))
            })?;
            for (key, value) in &args.new_spec {
                task.insert(Yaml::String(key.clone()), from_json(value)?);
            }
            yaml_proposal(
                source,
                &doc,
                format!("Modified task '{}'", args.task_name),
                json!({}),
            )
        })
    }
}

// ── add_task (proposal) ─────────────────────────────────────────────

#[derive(Deserialize)]
struct AddTaskArgs {
    path: String,
    task_spec: Map<String, Value>,
    #[serde(default)]
    after_task: Option<String>,
}

pub struct AddTaskTool;

/// Insert after the task named `after`, or append when absent or not found.
fn insert_task(tasks: &mut Vec<Yaml>, task: Yaml, after: Option<&str>) {
    let index = after
        .and_then(|after| {
            tasks.iter().position(|t| {
                t.as_mapping()
                    .is_some_and(|t| str_field(t, "name") == Some(after))
            })
        })
        .map_or(tasks.len(), |i| i + 1);
    tasks.insert(index, task);
}

impl Tool for AddTaskTool {
    fn kind(&self) -> ToolKind {
        ToolKind::AddTask
    }

    fn description(&self) -> &str {
        "Propose adding a task to a task file or to the first play of a playbook, optionally \
         after a named task. Nothing is written until the user approves"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": path_property("Playbook or task file"),
                "task_spec": { "type": "object", "description": "The task, e.g. {\"name\": \"...\", \"apt\": {...}}" },
                "after_task": { "type": "string", "description": "Name of the task to insert after (default: end)" }
            },
            "required": ["path", "task_spec"]
        })
    }

    fn execute<'a>(
        &'a self,
        args: Value,
        ctx: &'a ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = Result<ToolPayload, ToolError>> + Send + 'a>> {
        Box::pin(async move {
            let args: AddTaskArgs = parse_args(self.kind(), args)?;
            let after = args.after_task.as_deref().map(str::trim).filter(|a| !a.is_empty());
            let (source, mut doc) = load_yaml(ctx, &args.path).await?;
            let task = from_json(&Value::Object(args.task_spec.clone()))?;
            let name = args
                .task_spec
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("Unnamed")
                .to_string();

            let Some(items) = doc.as_sequence_mut() else {
                return Err(ToolError::parse(source.label, "Unexpected file format."));
            };
            let first_play = items
                .first_mut()
                .and_then(Yaml::as_mapping_mut)
                .filter(|play| play.contains_key("hosts"));
            if let Some(play) = first_play {
                let tasks = play
                    .entry(Yaml::from("tasks"))
                    .or_insert_with(|| Yaml::Sequence(Vec::new()));
                if !tasks.is_sequence() {
                    *tasks = Yaml::Sequence(Vec::new());
                }
                if let Some(tasks) = tasks.as_sequence_mut() {
                    insert_task(tasks, task, after);
                }
            } else {
                insert_task(items, task, after);
            }

            yaml_proposal(source, &doc, format!("Added task '{name}'"), json!({}))
        })
    }
}

// ── modify_variable (proposal) ──────────────────────────────────────

#[derive(Deserialize)]
struct ModifyVariableArgs {
    path: String,
    var_name: String,
    new_value: Value,
}

pub struct ModifyVariableTool;

impl Tool for ModifyVariableTool {
    fn kind(&self) -> ToolKind {
        ToolKind::ModifyVariable
    }

    fn description(&self) -> &str {
        "Propose setting a variable in a vars or defaults file. Nothing is written until the user approves"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": path_property("vars/defaults YAML file"),
                "var_name": { "type": "string" },
                "new_value": { "description": "New value (any JSON type)" }
            },
            "required": ["path", "var_name", "new_value"]
        })
    }

    fn execute<'a>(
        &'a self,
        args: Value,
        ctx: &'a ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = Result<ToolPayload, ToolError>> + Send + 'a>> {
        Box::pin(async move {
            let args: ModifyVariableArgs = parse_args(self.kind(), args)?;
            let (source, mut doc) = load_yaml(ctx, &args.path).await?;
            if doc.is_null() {
                doc = Yaml::Mapping(Mapping::new());
            }
            let Some(vars) = doc.as_mapping_mut() else {
                return Err(ToolError::parse(
                    source.label,
                    "File does not contain a variable dictionary.",
                ));
            };

            let new_value = from_json(&args.new_value)?;
            let old_value = vars
                .insert(Yaml::String(args.var_name.clone()), new_value.clone())
                .unwrap_or(Yaml::Null);
            let description = format!(
                "Modified variable '{}': {} -> {}",
                args.var_name,
                display_value(&old_value),
                display_value(&new_value)
            );
            let extra = json!({
                "old_value": to_json(&old_value),
                "new_value": args.new_value,
            });
            yaml_proposal(source, &doc, description, extra)
        })
    }
}

// ── modify_yaml_file (proposal) ─────────────────────────────────────

#[derive(Deserialize)]
struct ModifyYamlArgs {
    path: String,
    modifications: Map<String, Value>,
}

pub struct ModifyYamlFileTool;

/// Set `value` at a dot path. Numeric segments index into lists; missing
/// mapping keys are created along the way.
fn set_yaml_path(doc: &mut Yaml, key_path: &str, value: Yaml) -> Result<(), String> {
    let parts: Vec<&str> = key_path.split('.').collect();
    let Some((leaf, parents)) = parts.split_last() else {
        return Err("empty key path".into());
    };
    if leaf.is_empty() {
        return Err(format!("Cannot navigate to {key_path}"));
    }

    let mut current = doc;
    for part in parents {
        if current.is_null() {
            *current = Yaml::Mapping(Mapping::new());
        }
        current = match current {
            Yaml::Sequence(items) => part
                .parse::<usize>()
                .ok()
                .and_then(|i| items.get_mut(i))
                .ok_or_else(|| format!("Cannot navigate to {key_path}"))?,
            Yaml::Mapping(map) => map
                .entry(Yaml::from(*part))
                .or_insert_with(|| Yaml::Mapping(Mapping::new())),
            _ => return Err(format!("Cannot navigate to {key_path}")),
        };
    }

    match current {
        Yaml::Sequence(items) => {
            let slot = leaf
                .parse::<usize>()
                .ok()
                .and_then(|i| items.get_mut(i))
                .ok_or_else(|| format!("list index '{leaf}' out of range in {key_path}"))?;
            *slot = value;
        }
        Yaml::Mapping(map) => {
            map.insert(Yaml::from(*leaf), value);
        }
        Yaml::Null => {
            let mut map = Mapping::new();
            map.insert(Yaml::from(*leaf), value);
            *current = Yaml::Mapping(map);
        }
        _ => return Err(format!("Cannot navigate to {key_path}")),
    }
    Ok(())
}

impl Tool for ModifyYamlFileTool {
    fn kind(&self) -> ToolKind {
        ToolKind::ModifyYamlFile
    }

    fn description(&self) -> &str {
        "Propose setting values in any YAML file by dot path (e.g. '0.vars.http_port'; numeric \
         segments index lists). Nothing is written until the user approves"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": path_property("YAML file"),
                "modifications": { "type": "object", "description": "Map of dot path to new value" }
            },
            "required": ["path", "modifications"]
        })
    }

    fn execute<'a>(
        &'a self,
        args: Value,
        ctx: &'a ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = Result<ToolPayload, ToolError>> + Send + 'a>> {
        Box::pin(async move {
            let args: ModifyYamlArgs = parse_args(self.kind(), args)?;
            if args.modifications.is_empty() {
                return Err(invalid(self.kind(), "modifications is empty"));
            }
            let (source, mut doc) = load_yaml(ctx, &args.path).await?;
            for (key_path, value) in &args.modifications {
                set_yaml_path(&mut doc, key_path, from_json(value)?).map_err(|e| {
                    ToolError::Command(format!("Error applying modifications: {e}"))
                })?;
            }
            let description = format!(
                "Modified YAML file with {} change(s)",
                args.modifications.len()
            );
            yaml_proposal(source, &doc, description, json!({}))
        })
    }
}
