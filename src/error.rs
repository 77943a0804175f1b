use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error hierarchy for `codewarden`.
///
/// Each subsystem defines its own error variant. Library callers can match on
/// these to decide recovery strategy; plumbing code continues to use
/// `anyhow::Result` for ad-hoc context chains.
#[derive(Debug, Error)]
pub enum WardenError {
    // ── Config ───────────────────────────────────────────────────────────
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    // ── LLM / Provider ──────────────────────────────────────────────────
    #[error("llm: {0}")]
    Llm(#[from] LlmError),

    // ── Tools ───────────────────────────────────────────────────────────
    #[error("tool: {0}")]
    Tool(#[from] ToolError),

    // ── Approval workflow ───────────────────────────────────────────────
    #[error("workflow: {0}")]
    Workflow(#[from] WorkflowError),

    // ── Generic fallthrough (wraps anyhow for interop) ──────────────────
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ─── Config errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("repository path {0} is not a directory")]
    RepoNotFound(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

// ─── LLM / Provider errors ──────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("provider {provider} request failed: {message}")]
    Request { provider: String, message: String },

    #[error("provider {provider} rate-limited{}", retry_hint(.retry_after_secs))]
    RateLimited {
        provider: String,
        retry_after_secs: Option<u64>,
    },

    #[error("provider {provider} authentication failed")]
    Auth { provider: String },

    #[error("provider {provider} returned an unreadable response: {message}")]
    Decode { provider: String, message: String },

    #[error("unknown provider: {0}")]
    UnknownProvider(String),
}

fn retry_hint(retry_after_secs: &Option<u64>) -> String {
    retry_after_secs
        .map(|secs| format!(" (retry after {secs}s)"))
        .unwrap_or_default()
}

// ─── Tool errors ────────────────────────────────────────────────────────────

/// Failure of a single tool invocation. Always folded into a tool-result
/// message at the registry boundary; never propagated into the turn.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool {name} not found")]
    Unknown { name: String },

    #[error("invalid arguments for {tool}: {message}")]
    InvalidArguments { tool: String, message: String },

    #[error("'{0}' does not exist")]
    NotFound(String),

    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    Parse { path: String, message: String },

    #[error("{0}")]
    Command(String),

    #[error("{what} timed out after {secs}s")]
    Timeout { what: String, secs: u64 },

    #[error("access denied: {0}")]
    Denied(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("{0}")]
    NoMatch(String),
}

impl ToolError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn parse(path: impl Into<String>, message: impl ToString) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

// ─── Workflow errors ────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("malformed pending change: {0}")]
    MalformedChange(String),

    #[error("git: {0}")]
    Git(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_wraps_into_top_level() {
        let err: WardenError = ConfigError::Validation("temperature out of range".into()).into();
        assert_eq!(
            err.to_string(),
            "config: validation failed: temperature out of range"
        );
    }

    #[test]
    fn rate_limited_display_includes_retry_hint_when_known() {
        let with = LlmError::RateLimited {
            provider: "anthropic".into(),
            retry_after_secs: Some(30),
        };
        let without = LlmError::RateLimited {
            provider: "anthropic".into(),
            retry_after_secs: None,
        };
        assert_eq!(
            with.to_string(),
            "provider anthropic rate-limited (retry after 30s)"
        );
        assert_eq!(without.to_string(), "provider anthropic rate-limited");
    }

    #[test]
    fn tool_error_io_keeps_path_in_message() {
        let err = ToolError::io(
            "src/app.py",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().starts_with("src/app.py:"));
    }

    #[test]
    fn anyhow_error_is_transparent() {
        let err: WardenError = anyhow::anyhow!("boom").into();
        assert_eq!(err.to_string(), "boom");
    }
}
