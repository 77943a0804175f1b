use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// Every tool the catalog can expose. The snake_case form is the name the
/// oracle sees.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, EnumIter,
)]
#[strum(serialize_all = "snake_case")]
pub enum ToolKind {
    // File
    ReadFile,
    ListDirectory,
    FileExists,
    WriteFile,
    DeleteFile,
    // Git
    GitFetchAll,
    GitCreateBranch,
    GitCheckout,
    GitAdd,
    GitCommit,
    GitDiff,
    GitStatus,
    GitCurrentBranch,
    // Shell and search
    RunShellCommand,
    FindFiles,
    SearchInFiles,
    // Python
    AnalyzePythonFile,
    FindPythonPattern,
    FindFunctions,
    FindClasses,
    FindImports,
    ModifyPythonCode,
    AddImport,
    AddFunction,
    // Ansible / YAML
    ScanAnsibleProject,
    AnalyzePlaybook,
    AnalyzeRole,
    FindTasksUsingModule,
    GetVariableUsage,
    ModifyTask,
    AddTask,
    ModifyVariable,
    ModifyYamlFile,
    // Documents
    ReadReferenceDocument,
}

impl ToolKind {
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

/// Successful tool output.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolPayload {
    Text(String),
    Structured(Value),
}

impl ToolPayload {
    /// Text handed back to the oracle.
    pub fn render(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Structured(value) => {
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
            }
        }
    }

    /// The payload if it is shaped like a pending change: a structured
    /// object with a `diff` key.
    pub fn pending_change(&self) -> Option<&Value> {
        match self {
            Self::Structured(value) if value.get("diff").is_some() => Some(value),
            Self::Structured(_) | Self::Text(_) => None,
        }
    }
}

/// Outcome of one invocation as seen by the turn controller.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    Ok(ToolPayload),
    Err(String),
}

impl ToolOutcome {
    pub fn is_err(&self) -> bool {
        matches!(self, Self::Err(_))
    }

    pub fn render(&self) -> String {
        match self {
            Self::Ok(payload) => payload.render(),
            Self::Err(description) => format!("Error: {description}"),
        }
    }

    pub fn payload(&self) -> Option<&ToolPayload> {
        match self {
            Self::Ok(payload) => Some(payload),
            Self::Err(_) => None,
        }
    }
}

/// Description of a tool for the LLM
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}
