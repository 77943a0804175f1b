use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Upper bound on tool iterations per turn, regardless of what the config asks for.
pub const MAX_ITERATIONS_HARD_CAP: u32 = 50;

fn default_provider() -> String {
    "anthropic".to_string()
}

fn default_model() -> String {
    "claude-3-5-haiku-latest".to_string()
}

fn default_max_tokens() -> u32 {
    8192
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to config.toml - computed at load time, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,
    pub api_key: Option<String>,
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Override for the provider endpoint (proxies, local gateways, tests).
    pub base_url: Option<String>,
    /// Repository the assistant works on. `~` is expanded.
    pub repo_path: Option<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub workflow: WorkflowConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_path: PathBuf::new(),
            api_key: None,
            provider: default_provider(),
            model: default_model(),
            temperature: 0.0,
            max_tokens: default_max_tokens(),
            base_url: None,
            repo_path: None,
            log_level: default_log_level(),
            tools: ToolsConfig::default(),
            workflow: WorkflowConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Wall-clock limit for `run_shell_command`.
    pub shell_timeout_secs: u64,
    /// Wall-clock limit for every git invocation.
    pub git_timeout_secs: u64,
    /// Shell output beyond this many characters is cut with a marker.
    pub max_output_chars: usize,
    pub max_search_results: usize,
    pub max_directory_items: usize,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            shell_timeout_secs: 120,
            git_timeout_secs: 60,
            max_output_chars: 10_000,
            max_search_results: 50,
            max_directory_items: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Oracle round-trips allowed within one human turn.
    pub max_iterations: u32,
    /// Diff lines shown per file before the preview is truncated.
    pub diff_preview_lines: usize,
    /// Changed files listed in a push request before "N more".
    pub push_file_cap: usize,
    pub remote: String,
    pub branch_prefix: String,
    /// Characters of reference-document text embedded in the system message.
    pub reference_char_limit: usize,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_iterations: 25,
            diff_preview_lines: 20,
            push_file_cap: 15,
            remote: "origin".to_string(),
            branch_prefix: "agent-".to_string(),
            reference_char_limit: 50_000,
        }
    }
}
