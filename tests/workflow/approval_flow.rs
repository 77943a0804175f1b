use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use codewarden::error::ToolError;
use codewarden::llm::MessageRole;
use codewarden::tools::file_ops::ReadFileTool;
use codewarden::tools::{
    ExecutionContext, Tool, ToolKind, ToolPayload, ToolRegistry, default_registry,
};
use codewarden::workflow::{
    GateState, GateTransition, SessionContext, SessionState, TurnController, TurnSettings,
};
use serde_json::{Value, json};
use tempfile::TempDir;

use crate::support::{MockProvider, text, tool_calls, tool_results};

const UTILS: &str = "def foo(x):\n    return x\n\n\nresult = foo(1)\n";

fn setup(provider: Arc<MockProvider>) -> (TempDir, TurnController, SessionState) {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("utils.py"), UTILS).unwrap();
    let controller = TurnController::new(
        provider,
        Arc::new(default_registry()),
        ExecutionContext::new(tmp.path()),
        TurnSettings::default(),
        "You are a careful coding agent.".into(),
    );
    let state = SessionState::new(SessionContext::new(tmp.path().to_path_buf()));
    (tmp, controller, state)
}

fn rename_call() -> (&'static str, Value) {
    (
        "modify_python_code",
        json!({"path": "utils.py", "pattern": "foo($X)", "replacement": "bar($X)"}),
    )
}

#[tokio::test]
async fn modification_proposal_opens_the_gate() {
    let provider = MockProvider::new(vec![
        tool_calls(&[rename_call()]),
        text("I propose renaming the call. Approve?"),
    ]);
    let (tmp, mut controller, mut state) = setup(provider.clone());

    let report = controller
        .run_turn(&mut state, "rename function foo to bar in utils.py")
        .await
        .unwrap();

    assert_eq!(report.transition, GateTransition::Unchanged);
    assert_eq!(state.modification.state(), GateState::Awaiting);
    assert_eq!(state.plan.len(), 1);
    let change = &state.plan.changes()[0];
    assert_eq!(change.target_path, "utils.py");
    assert!(change.diff.contains("+result = bar(1)"));
    // Nothing touches the disk before approval.
    assert_eq!(
        std::fs::read_to_string(tmp.path().join("utils.py")).unwrap(),
        UTILS
    );

    let seen = provider.seen_messages();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0][0].role, MessageRole::System);
    let results = tool_results(&seen[1]);
    assert_eq!(results.len(), 1);
    assert!(!results[0].1);
}

#[tokio::test]
async fn approval_consumes_the_plan_and_writes_files() {
    let provider = MockProvider::new(vec![
        tool_calls(&[rename_call()]),
        text("Plan ready."),
        text("Applied. Shall I commit?"),
    ]);
    let (tmp, mut controller, mut state) = setup(provider.clone());
    controller.run_turn(&mut state, "rename foo").await.unwrap();

    let report = controller.run_turn(&mut state, "  Approve ").await.unwrap();
    let GateTransition::ModificationApproved(changes) = &report.transition else {
        panic!("expected approval, got {:?}", report.transition);
    };
    assert_eq!(changes.len(), 1);
    assert_eq!(state.modification.state(), GateState::Approved);
    assert!(state.plan.is_empty());
    assert_eq!(
        std::fs::read_to_string(tmp.path().join("utils.py")).unwrap(),
        UTILS.replace("foo(1)", "bar(1)")
    );

    // The oracle learns what was applied, and no reminder is attached.
    let last_call = provider.seen_messages().pop().unwrap();
    let note = last_call.last().unwrap();
    assert_eq!(note.role, MessageRole::System);
    assert!(note.text_content().unwrap().contains("Applied 1/1"));
}

#[tokio::test]
async fn rejection_discards_the_plan() {
    let provider = MockProvider::new(vec![
        tool_calls(&[rename_call()]),
        text("Plan ready."),
        text("Understood, nothing changed."),
    ]);
    let (tmp, mut controller, mut state) = setup(provider);
    controller.run_turn(&mut state, "rename foo").await.unwrap();

    let report = controller.run_turn(&mut state, "reject").await.unwrap();
    assert_eq!(
        report.transition,
        GateTransition::ModificationRejected { discarded: 1 }
    );
    assert_eq!(state.modification.state(), GateState::Rejected);
    assert!(state.plan.is_empty());
    assert_eq!(
        std::fs::read_to_string(tmp.path().join("utils.py")).unwrap(),
        UTILS
    );
}

#[tokio::test]
async fn feedback_keeps_the_gate_open_and_reaches_the_oracle() {
    let provider = MockProvider::new(vec![
        tool_calls(&[rename_call()]),
        text("Plan ready."),
        tool_calls(&[(
            "add_import",
            json!({"path": "utils.py", "import_stmt": "import logging"}),
        )]),
        text("Updated plan."),
    ]);
    let (_tmp, mut controller, mut state) = setup(provider.clone());
    controller.run_turn(&mut state, "rename foo").await.unwrap();

    let report = controller
        .run_turn(&mut state, "please also import logging")
        .await
        .unwrap();
    assert!(matches!(report.transition, GateTransition::Feedback { .. }));
    assert_eq!(state.modification.state(), GateState::Awaiting);
    assert_eq!(
        state.feedback.as_deref(),
        Some("please also import logging")
    );

    // The second proposal read the planned content, so both edits land in
    // one entry for the file.
    assert_eq!(state.plan.len(), 1);
    let change = &state.plan.changes()[0];
    assert!(change.new_content.starts_with("import logging\n"));
    assert!(change.new_content.contains("result = bar(1)"));

    let third_call = &provider.seen_messages()[2];
    let reminder = third_call.last().unwrap().text_content().unwrap();
    assert!(reminder.contains("awaiting user approval"));
    assert!(reminder.contains("please also import logging"));
    assert!(reminder.contains("1. [MODIFY] utils.py"));
}

#[tokio::test]
async fn approve_without_open_gate_is_a_no_op() {
    let provider = MockProvider::new(vec![text("Nothing is pending.")]);
    let (_tmp, mut controller, mut state) = setup(provider);

    let report = controller.run_turn(&mut state, "approve").await.unwrap();
    assert_eq!(report.transition, GateTransition::Unchanged);
    assert_eq!(report.reply, "Nothing is pending.");
    assert_eq!(state.modification.state(), GateState::Closed);
}

struct ExplodingTool;

impl Tool for ExplodingTool {
    fn kind(&self) -> ToolKind {
        ToolKind::AnalyzePythonFile
    }

    fn description(&self) -> &str {
        "always panics"
    }

    fn parameters_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    fn execute<'a>(
        &'a self,
        _args: Value,
        _ctx: &'a ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = Result<ToolPayload, ToolError>> + Send + 'a>> {
        Box::pin(async move { explode() })
    }
}

fn explode() -> Result<ToolPayload, ToolError> {
    panic!("parser state corrupted")
}

#[tokio::test]
async fn crashing_tool_becomes_an_error_result() {
    let provider = MockProvider::new(vec![
        tool_calls(&[
            ("analyze_python_file", json!({"path": "utils.py"})),
            ("read_file", json!({"path": "missing.py"})),
        ]),
        text("The analyzer crashed and the file is missing."),
    ]);
    let tmp = TempDir::new().unwrap();
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(ExplodingTool));
    registry.register(Box::new(ReadFileTool));
    let mut controller = TurnController::new(
        provider.clone(),
        Arc::new(registry),
        ExecutionContext::new(tmp.path()),
        TurnSettings::default(),
        "system".into(),
    );
    let mut state = SessionState::new(SessionContext::new(tmp.path().to_path_buf()));

    let report = controller.run_turn(&mut state, "analyze").await.unwrap();
    assert_eq!(report.reply, "The analyzer crashed and the file is missing.");
    assert_eq!(state.modification.state(), GateState::Closed);
    assert_eq!(state.push.state(), GateState::Closed);

    let results = tool_results(&provider.seen_messages()[1]);
    assert_eq!(results.len(), 2);
    assert!(results[0].1);
    assert!(results[0].0.contains("parser state corrupted"));
    assert!(results[1].1);
    assert!(results[1].0.starts_with("Error: "));
}
