use std::sync::Arc;

use codewarden::tools::{ExecutionContext, default_registry};
use codewarden::workflow::{
    GateKind, GateState, GateTransition, SessionContext, SessionState, TurnController,
    TurnSettings,
};
use serde_json::json;
use tempfile::TempDir;

use crate::support::{MockProvider, git, git_available, init_repo, text, tool_calls};

struct Fixture {
    _tmp: TempDir,
    work: std::path::PathBuf,
    remote: std::path::PathBuf,
}

fn fixture() -> Fixture {
    let tmp = TempDir::new().unwrap();
    let remote = tmp.path().join("remote.git");
    let work = tmp.path().join("work");
    std::fs::create_dir_all(&work).unwrap();
    git(tmp.path(), &["init", "-q", "--bare", "remote.git"]);
    init_repo(&work);
    git(&work, &["remote", "add", "origin", remote.to_str().unwrap()]);
    git(&work, &["checkout", "-q", "-b", "agent-add-settings"]);
    Fixture {
        _tmp: tmp,
        work,
        remote,
    }
}

fn controller(provider: Arc<MockProvider>, fixture: &Fixture) -> TurnController {
    TurnController::new(
        provider,
        Arc::new(default_registry()),
        ExecutionContext::new(&fixture.work),
        TurnSettings::default(),
        "system".into(),
    )
}

fn commit_script() -> Vec<codewarden::llm::ProviderResponse> {
    vec![
        // Turn 1: propose a new file.
        tool_calls(&[(
            "write_file",
            json!({"path": "settings.py", "content": "DEBUG = False\n"}),
        )]),
        text("Plan ready."),
        // Turn 2 (approve): stage and commit what was applied.
        tool_calls(&[
            ("git_add", json!({"files": "settings.py"})),
            ("git_commit", json!({"message": "Add settings"})),
        ]),
        text("Committed. Push?"),
    ]
}

#[tokio::test]
async fn commit_opens_push_gate_and_push_publishes_branch() {
    if !git_available() {
        return;
    }
    let fixture = fixture();
    let mut script = commit_script();
    script.push(text("Pushed."));
    let provider = MockProvider::new(script);
    let mut controller = controller(provider.clone(), &fixture);
    let mut state = SessionState::new(SessionContext::new(fixture.work.clone()));

    controller.run_turn(&mut state, "add a settings module").await.unwrap();
    assert_eq!(state.awaiting(), Some(GateKind::Modification));

    controller.run_turn(&mut state, "approve").await.unwrap();
    assert_eq!(
        std::fs::read_to_string(fixture.work.join("settings.py")).unwrap(),
        "DEBUG = False\n"
    );
    assert_eq!(state.awaiting(), Some(GateKind::Push));
    let request = state.push_request.clone().unwrap();
    assert_eq!(request.branch, "agent-add-settings");
    assert_eq!(request.commit_count, 2);
    assert!(request.files_changed.contains(&"settings.py".to_string()));
    assert_eq!(state.current_branch.as_deref(), Some("agent-add-settings"));

    // Nothing reaches the remote before approval.
    assert!(git(&fixture.remote, &["branch", "--list"]).is_empty());

    let report = controller.run_turn(&mut state, "push").await.unwrap();
    assert!(matches!(report.transition, GateTransition::PushApproved(_)));
    assert_eq!(state.push.state(), GateState::Approved);
    assert!(state.push_request.is_none());
    let published = git(&fixture.remote, &["rev-parse", "agent-add-settings"]);
    let local = git(&fixture.work, &["rev-parse", "HEAD"]);
    assert_eq!(published, local);

    let last_call = provider.seen_messages().pop().unwrap();
    let note = last_call.last().unwrap().text_content().unwrap();
    assert!(note.contains("Pushed branch 'agent-add-settings' to 'origin'."));
}

#[tokio::test]
async fn cancelled_push_keeps_commits_local() {
    if !git_available() {
        return;
    }
    let fixture = fixture();
    let mut script = commit_script();
    script.push(text("Okay, not pushing."));
    let provider = MockProvider::new(script);
    let mut controller = controller(provider, &fixture);
    let mut state = SessionState::new(SessionContext::new(fixture.work.clone()));

    controller.run_turn(&mut state, "add a settings module").await.unwrap();
    controller.run_turn(&mut state, "yes").await.unwrap();
    assert_eq!(state.awaiting(), Some(GateKind::Push));

    let report = controller.run_turn(&mut state, "cancel").await.unwrap();
    assert!(matches!(report.transition, GateTransition::PushRejected(_)));
    assert_eq!(state.push.state(), GateState::Rejected);
    assert_eq!(state.awaiting(), None);
    assert!(
        git(&fixture.remote, &["branch", "--list"]).is_empty(),
        "remote should have no branches"
    );
}
