use super::{
    is_play, is_playbook, load_yaml, load_yaml_tree, module_matches, str_field, task_module,
    to_json,
};
use crate::error::ToolError;
use crate::tools::common::{parse_args, path_property};
use crate::tools::traits::{ExecutionContext, Tool};
use crate::tools::types::{ToolKind, ToolPayload};
use regex::Regex;
use serde::Deserialize;
use serde_json::{Value, json};
use serde_yaml_ng::{Mapping, Value as Yaml};
use std::collections::HashSet;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::LazyLock;

static JINJA_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([a-zA-Z_][a-zA-Z0-9_]*)").expect("valid regex")
});

#[derive(Deserialize)]
struct PathArgs {
    path: String,
}

#[derive(Deserialize)]
struct ModuleArgs {
    path: String,
    module: String,
}

fn path_schema(description: &str) -> Value {
    json!({
        "type": "object",
        "properties": { "path": path_property(description) },
        "required": ["path"]
    })
}

fn mappings(value: Option<&Yaml>) -> impl Iterator<Item = &Mapping> {
    value
        .and_then(Yaml::as_sequence)
        .into_iter()
        .flatten()
        .filter_map(Yaml::as_mapping)
}

fn task_summary(task: &Mapping) -> Value {
    json!({
        "name": str_field(task, "name").unwrap_or("Unnamed task"),
        "module": task_module(task),
    })
}

fn play_summary(play: &Mapping) -> Value {
    let vars: Vec<Value> = play
        .get("vars")
        .and_then(Yaml::as_mapping)
        .map(|vars| vars.keys().map(to_json).collect())
        .unwrap_or_default();
    let roles: Vec<Value> = play
        .get("roles")
        .and_then(Yaml::as_sequence)
        .into_iter()
        .flatten()
        .filter_map(|role| match role {
            Yaml::String(name) => Some(json!({ "name": name })),
            Yaml::Mapping(spec) => Some(json!({
                "name": str_field(spec, "role")
                    .or_else(|| str_field(spec, "name"))
                    .unwrap_or("unknown")
            })),
            _ => None,
        })
        .collect();
    let handlers: Vec<Value> = mappings(play.get("handlers"))
        .map(|h| json!({ "name": str_field(h, "name").unwrap_or("Unnamed handler") }))
        .collect();

    json!({
        "name": str_field(play, "name").unwrap_or("Unnamed play"),
        "hosts": play.get("hosts").map(to_json).unwrap_or(json!("")),
        "tasks": mappings(play.get("tasks")).map(task_summary).collect::<Vec<_>>(),
        "roles": roles,
        "vars": vars,
        "handlers": handlers,
    })
}

fn count(value: &Value, key: &str) -> usize {
    value[key].as_array().map_or(0, Vec::len)
}

// ── analyze_playbook ────────────────────────────────────────────────

pub struct AnalyzePlaybookTool;

impl Tool for AnalyzePlaybookTool {
    fn kind(&self) -> ToolKind {
        ToolKind::AnalyzePlaybook
    }

    fn description(&self) -> &str {
        "Analyze a playbook: plays with hosts, tasks and their modules, roles, vars and handlers"
    }

    fn parameters_schema(&self) -> Value {
        path_schema("Path to the playbook YAML file")
    }

    fn execute<'a>(
        &'a self,
        args: Value,
        ctx: &'a ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = Result<ToolPayload, ToolError>> + Send + 'a>> {
        Box::pin(async move {
            let args: PathArgs = parse_args(self.kind(), args)?;
            let (source, doc) = load_yaml(ctx, &args.path).await?;
            let Some(items) = doc.as_sequence() else {
                return Err(ToolError::parse(
                    source.label,
                    "Invalid playbook format. Expected a list of plays.",
                ));
            };

            let plays: Vec<Value> = items
                .iter()
                .filter_map(Yaml::as_mapping)
                .map(play_summary)
                .collect();
            let total_tasks: usize = plays.iter().map(|p| count(p, "tasks")).sum();
            let total_roles: usize = plays.iter().map(|p| count(p, "roles")).sum();
            Ok(ToolPayload::Structured(json!({
                "file": source.label,
                "summary": {
                    "play_count": plays.len(),
                    "total_tasks": total_tasks,
                    "total_roles": total_roles,
                },
                "plays": plays,
            })))
        })
    }
}

// ── analyze_role ────────────────────────────────────────────────────

pub struct AnalyzeRoleTool;

async fn role_yaml(ctx: &ExecutionContext, role: &str, section: &str) -> Option<Yaml> {
    for ext in ["yml", "yaml"] {
        let raw = format!("{role}/{section}/main.{ext}");
        if let Ok(source) = ctx.read_source(&raw).await {
            return serde_yaml_ng::from_str(&source.content).ok();
        }
    }
    None
}

fn file_names(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.path().is_file())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

impl Tool for AnalyzeRoleTool {
    fn kind(&self) -> ToolKind {
        ToolKind::AnalyzeRole
    }

    fn description(&self) -> &str {
        "Analyze a role directory: tasks, handlers, defaults, vars, meta, templates and files"
    }

    fn parameters_schema(&self) -> Value {
        path_schema("Path to the role directory")
    }

    fn execute<'a>(
        &'a self,
        args: Value,
        ctx: &'a ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = Result<ToolPayload, ToolError>> + Send + 'a>> {
        Box::pin(async move {
            let args: PathArgs = parse_args(self.kind(), args)?;
            let dir = ctx.resolve(&args.path)?;
            let label = ctx.label(&dir);
            if !dir.exists() {
                return Err(ToolError::NotFound(label));
            }
            if !dir.is_dir() {
                return Err(ToolError::Command(format!("'{label}' is not a directory")));
            }

            let tasks = role_yaml(ctx, &label, "tasks").await;
            let handlers = role_yaml(ctx, &label, "handlers").await;
            let defaults = role_yaml(ctx, &label, "defaults").await;
            let vars = role_yaml(ctx, &label, "vars").await;
            let meta = role_yaml(ctx, &label, "meta").await;

            let tasks: Vec<Value> = mappings(tasks.as_ref()).map(task_summary).collect();
            let handlers: Vec<Value> = mappings(handlers.as_ref())
                .map(|h| json!(str_field(h, "name").unwrap_or("Unnamed")))
                .collect();
            let as_object = |value: Option<Yaml>| {
                value
                    .filter(|v| v.is_mapping())
                    .map_or_else(|| json!({}), |v| to_json(&v))
            };
            let name = dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| label.clone());

            Ok(ToolPayload::Structured(json!({
                "name": name,
                "path": label,
                "tasks": tasks,
                "handlers": handlers,
                "defaults": as_object(defaults),
                "vars": as_object(vars),
                "meta": as_object(meta),
                "templates": file_names(&dir.join("templates")),
                "files": file_names(&dir.join("files")),
            })))
        })
    }
}

// ── scan_ansible_project ────────────────────────────────────────────

pub struct ScanAnsibleProjectTool;

/// Directory of the role a `roles/<name>/...` file belongs to.
fn role_of(label: &str) -> Option<String> {
    let parts: Vec<&str> = label.split('/').collect();
    let idx = parts.iter().position(|part| *part == "roles")?;
    (parts.len() > idx + 2).then(|| parts[..=idx + 1].join("/"))
}

impl Tool for ScanAnsibleProjectTool {
    fn kind(&self) -> ToolKind {
        ToolKind::ScanAnsibleProject
    }

    fn description(&self) -> &str {
        "Scan an Ansible project directory for playbooks, roles and task files"
    }

    fn parameters_schema(&self) -> Value {
        path_schema("Project directory (use '.' for the repository root)")
    }

    fn execute<'a>(
        &'a self,
        args: Value,
        ctx: &'a ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = Result<ToolPayload, ToolError>> + Send + 'a>> {
        Box::pin(async move {
            let args: PathArgs = parse_args(self.kind(), args)?;
            let root = ctx.resolve(&args.path)?;
            if !root.is_dir() {
                return Err(ToolError::Command(format!(
                    "Path '{}' is not a directory.",
                    ctx.label(&root)
                )));
            }
            let files = load_yaml_tree(ctx, &args.path).await?;

            let mut playbooks = Vec::new();
            let mut taskfiles = Vec::new();
            let mut role_dirs: Vec<String> = Vec::new();
            for (source, doc) in &files {
                if let Some(role) = role_of(&source.label)
                    && !role_dirs.contains(&role)
                {
                    role_dirs.push(role);
                }
                if is_playbook(doc) {
                    let plays: Vec<&Mapping> = doc
                        .as_sequence()
                        .into_iter()
                        .flatten()
                        .filter_map(Yaml::as_mapping)
                        .filter(|item| is_play(item))
                        .collect();
                    playbooks.push(json!({
                        "filepath": source.label,
                        "plays": plays.iter().map(|p| str_field(p, "name").unwrap_or("Unnamed play")).collect::<Vec<_>>(),
                    }));
                } else if doc.is_sequence()
                    && source
                        .label
                        .split('/')
                        .any(|part| part == "tasks" || part == "handlers")
                {
                    taskfiles.push(json!({
                        "filepath": source.label,
                        "task_count": doc.as_sequence().map_or(0, Vec::len),
                    }));
                }
            }

            let mut roles = Vec::new();
            for role in &role_dirs {
                let defaults = role_yaml(ctx, role, "defaults").await;
                roles.push(json!({
                    "name": role.rsplit('/').next().unwrap_or(role.as_str()),
                    "filepath": role,
                    "default_variables": defaults.as_ref().map_or(json!({}), to_json),
                }));
            }

            Ok(ToolPayload::Structured(json!({
                "path": ctx.label(&root),
                "summary": {
                    "playbook_count": playbooks.len(),
                    "role_count": roles.len(),
                    "taskfile_count": taskfiles.len(),
                },
                "playbooks": playbooks,
                "roles": roles,
                "taskfiles": taskfiles,
            })))
        })
    }
}

// ── find_tasks_using_module ─────────────────────────────────────────

pub struct FindTasksUsingModuleTool;

/// Collect tasks (descending into block/rescue/always) that invoke `module`.
fn collect_module_tasks(
    tasks: Option<&Yaml>,
    module: &str,
    file: &str,
    context: &str,
    out: &mut Vec<Value>,
) {
    for task in mappings(tasks) {
        let uses = task
            .keys()
            .filter_map(Yaml::as_str)
            .any(|key| module_matches(key, module));
        if uses {
            out.push(json!({
                "file": file,
                "task_name": str_field(task, "name").unwrap_or("Unnamed"),
                "module": module,
                "context": context,
            }));
        }
        for section in ["block", "rescue", "always"] {
            collect_module_tasks(task.get(section), module, file, context, out);
        }
    }
}

impl Tool for FindTasksUsingModuleTool {
    fn kind(&self) -> ToolKind {
        ToolKind::FindTasksUsingModule
    }

    fn description(&self) -> &str {
        "Find tasks that use a given module (e.g. 'apt', 'copy'), in a file or a directory tree"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": path_property("Playbook, task file or directory to search"),
                "module": { "type": "string", "description": "Module name, short or ansible.builtin.*" }
            },
            "required": ["path", "module"]
        })
    }

    fn execute<'a>(
        &'a self,
        args: Value,
        ctx: &'a ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = Result<ToolPayload, ToolError>> + Send + 'a>> {
        Box::pin(async move {
            let args: ModuleArgs = parse_args(self.kind(), args)?;
            let files = load_yaml_tree(ctx, &args.path).await?;
            let mut results = Vec::new();
            for (source, doc) in &files {
                let file = source.label.as_str();
                if let Some(items) = doc.as_sequence() {
                    for item in items.iter().filter_map(Yaml::as_mapping) {
                        if is_play(item) {
                            let play = str_field(item, "name").unwrap_or("unnamed");
                            let context = format!("play: {play}");
                            for section in ["pre_tasks", "tasks", "post_tasks"] {
                                collect_module_tasks(
                                    item.get(section),
                                    &args.module,
                                    file,
                                    &context,
                                    &mut results,
                                );
                            }
                            collect_module_tasks(
                                item.get("handlers"),
                                &args.module,
                                file,
                                "handlers",
                                &mut results,
                            );
                        }
                    }
                    if !is_playbook(doc) {
                        collect_module_tasks(Some(doc), &args.module, file, "tasks", &mut results);
                    }
                } else if let Some(map) = doc.as_mapping() {
                    collect_module_tasks(map.get("tasks"), &args.module, file, "tasks", &mut results);
                }
            }

            if results.is_empty() {
                return Ok(ToolPayload::Text(format!(
                    "No tasks found using module '{}'",
                    args.module
                )));
            }
            Ok(ToolPayload::Structured(Value::Array(results)))
        })
    }
}

// ── get_variable_usage ──────────────────────────────────────────────

pub struct GetVariableUsageTool;

fn in_dir_named(label: &str, pred: impl Fn(&str) -> bool) -> bool {
    let parts: Vec<&str> = label.split('/').collect();
    parts[..parts.len().saturating_sub(1)]
        .iter()
        .any(|part| pred(part))
}

impl Tool for GetVariableUsageTool {
    fn kind(&self) -> ToolKind {
        ToolKind::GetVariableUsage
    }

    fn description(&self) -> &str {
        "Report variable definitions (vars, group_vars, host_vars), role defaults, and where variables are referenced in templates"
    }

    fn parameters_schema(&self) -> Value {
        path_schema("Project directory or YAML file")
    }

    fn execute<'a>(
        &'a self,
        args: Value,
        ctx: &'a ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = Result<ToolPayload, ToolError>> + Send + 'a>> {
        Box::pin(async move {
            let args: PathArgs = parse_args(self.kind(), args)?;
            let files = load_yaml_tree(ctx, &args.path).await?;

            let mut definitions = serde_json::Map::new();
            let mut defaults = serde_json::Map::new();
            let mut usage = Vec::new();
            let mut seen = HashSet::new();
            for (source, doc) in &files {
                let file = source.label.as_str();
                if let Some(map) = doc.as_mapping() {
                    let target = if in_dir_named(file, |part| part == "defaults") {
                        Some(&mut defaults)
                    } else if in_dir_named(file, |part| part == "vars" || part.ends_with("_vars")) {
                        Some(&mut definitions)
                    } else {
                        None
                    };
                    if let Some(target) = target {
                        for (key, value) in map {
                            if let Some(key) = key.as_str() {
                                target.insert(
                                    key.to_string(),
                                    json!({ "value": to_json(value), "file": file }),
                                );
                            }
                        }
                    }
                }
                for caps in JINJA_VAR.captures_iter(&source.content) {
                    let variable = caps[1].to_string();
                    if seen.insert((variable.clone(), file.to_string())) {
                        usage.push(json!({ "variable": variable, "file": file }));
                    }
                }
            }

            Ok(ToolPayload::Structured(json!({
                "definitions": definitions,
                "defaults": defaults,
                "usage": usage,
            })))
        })
    }
}
