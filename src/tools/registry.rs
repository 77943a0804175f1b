use super::traits::{ExecutionContext, Tool};
use super::types::{ToolKind, ToolOutcome, ToolSpec};
use futures_util::FutureExt;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use std::sync::Arc;

/// The tool catalog: a fixed mapping from tool identity to implementation.
///
/// Every failure mode of an invocation (unknown name, tool error, panic) is
/// folded into [`ToolOutcome::Err`] here, so callers never need a catch-all.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<ToolKind, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Replaces any existing tool of the same kind.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let tool: Arc<dyn Tool> = Arc::from(tool);
        self.tools.insert(tool.kind(), tool);
    }

    pub fn get(&self, kind: ToolKind) -> Option<&Arc<dyn Tool>> {
        self.tools.get(&kind)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Return sorted list of registered tool names.
    pub fn tool_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.tools.keys().map(|k| k.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Specs for all registered tools, sorted by name so requests are stable.
    pub fn specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self.tools.values().map(|tool| tool.spec()).collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    /// Execute a tool by the name the oracle used.
    pub async fn execute(&self, name: &str, args: Value, ctx: &ExecutionContext) -> ToolOutcome {
        let Some(tool) = ToolKind::from_str(name)
            .ok()
            .and_then(|kind| self.tools.get(&kind))
        else {
            return ToolOutcome::Err(format!("Tool not found: {name}"));
        };

        match AssertUnwindSafe(tool.execute(args, ctx)).catch_unwind().await {
            Ok(Ok(payload)) => ToolOutcome::Ok(payload),
            Ok(Err(e)) => ToolOutcome::Err(e.to_string()),
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(ToString::to_string)
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!(tool = name, %message, "tool panicked");
                ToolOutcome::Err(format!("tool {name} crashed: {message}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToolError;
    use crate::tools::types::ToolPayload;
    use serde_json::json;
    use std::future::Future;
    use std::pin::Pin;

    struct EchoTool;

    impl Tool for EchoTool {
        fn kind(&self) -> ToolKind {
            ToolKind::ReadFile
        }

        fn description(&self) -> &str {
            "echo"
        }

        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }

        fn execute<'a>(
            &'a self,
            args: Value,
            _ctx: &'a ExecutionContext,
        ) -> Pin<Box<dyn Future<Output = Result<ToolPayload, ToolError>> + Send + 'a>> {
            Box::pin(async move {
                match args.get("fail").and_then(Value::as_str) {
                    Some(reason) => Err(ToolError::Command(reason.to_string())),
                    None => Ok(ToolPayload::Text(args.to_string())),
                }
            })
        }
    }

    struct PanickingTool;

    impl Tool for PanickingTool {
        fn kind(&self) -> ToolKind {
            ToolKind::GitStatus
        }

        fn description(&self) -> &str {
            "always panics"
        }

        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }

        fn execute<'a>(
            &'a self,
            args: Value,
            _ctx: &'a ExecutionContext,
        ) -> Pin<Box<dyn Future<Output = Result<ToolPayload, ToolError>> + Send + 'a>> {
            Box::pin(async move {
                let lines: Vec<String> = Vec::new();
                let index = usize::try_from(args.as_u64().unwrap_or(3)).unwrap_or(3);
                Ok(ToolPayload::Text(lines[index].clone()))
            })
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        registry.register(Box::new(PanickingTool));
        registry
    }

    #[tokio::test]
    async fn executes_registered_tool() {
        let ctx = ExecutionContext::new("/tmp");
        let outcome = registry()
            .execute("read_file", json!({"path": "a"}), &ctx)
            .await;
        assert!(matches!(outcome, ToolOutcome::Ok(ToolPayload::Text(_))));
    }

    #[tokio::test]
    async fn unknown_tool_is_an_error_outcome() {
        let ctx = ExecutionContext::new("/tmp");
        let outcome = registry().execute("git_push", json!({}), &ctx).await;
        assert_eq!(outcome, ToolOutcome::Err("Tool not found: git_push".into()));
    }

    #[tokio::test]
    async fn tool_errors_become_descriptions() {
        let ctx = ExecutionContext::new("/tmp");
        let outcome = registry()
            .execute("read_file", json!({"fail": "disk on fire"}), &ctx)
            .await;
        assert_eq!(outcome, ToolOutcome::Err("disk on fire".into()));
    }

    #[tokio::test]
    async fn panics_are_captured() {
        let ctx = ExecutionContext::new("/tmp");
        let outcome = registry().execute("git_status", json!({}), &ctx).await;
        match outcome {
            ToolOutcome::Err(message) => assert!(message.contains("index out of bounds")),
            ToolOutcome::Ok(_) => panic!("expected error outcome"),
        }
    }

    #[test]
    fn names_and_specs_are_sorted() {
        let registry = registry();
        assert_eq!(registry.tool_names(), ["git_status", "read_file"]);
        let names: Vec<String> = registry.specs().into_iter().map(|s| s.name).collect();
        assert_eq!(names, ["git_status", "read_file"]);
    }
}
