use std::sync::Arc;

use codewarden::Config;
use codewarden::agent::SessionDriver;
use codewarden::error::LlmError;
use codewarden::tools::default_registry;
use codewarden::workflow::{GateKind, SessionContext};
use serde_json::json;
use tempfile::TempDir;

use crate::support::{MockProvider, text, tool_calls};

fn driver(provider: Arc<MockProvider>, tmp: &TempDir) -> SessionDriver {
    SessionDriver::new(
        &Config::default(),
        provider,
        Arc::new(default_registry()),
        SessionContext::new(tmp.path().to_path_buf()),
    )
}

async fn converse(driver: &mut SessionDriver, script: &str) -> String {
    let mut out = Vec::new();
    driver
        .run_interactive(tokio::io::BufReader::new(script.as_bytes()), &mut out)
        .await
        .unwrap();
    String::from_utf8(out).unwrap()
}

#[tokio::test]
async fn exit_command_ends_session_without_calling_the_oracle() {
    let tmp = TempDir::new().unwrap();
    let provider = MockProvider::new(vec![]);
    let mut driver = driver(provider.clone(), &tmp);

    let out = converse(&mut driver, "\n   \nQuit\nnever read\n").await;
    assert!(out.contains("Codewarden"));
    assert!(out.contains("Goodbye!"));
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn open_plan_is_printed_after_the_reply() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("app.py"), "print('hi')\n").unwrap();
    let provider = MockProvider::new(vec![
        tool_calls(&[(
            "write_file",
            json!({"path": "app.py", "content": "print('hello')\n", "description": "Longer greeting"}),
        )]),
        text("Here is the plan."),
    ]);
    let mut driver = driver(provider, &tmp);

    let out = converse(&mut driver, "make the greeting longer\n").await;
    assert!(out.contains("Agent: Here is the plan."));
    assert!(out.contains("PROPOSED MODIFICATIONS"));
    assert!(out.contains("1. [MODIFY] app.py"));
    assert!(out.contains("Longer greeting"));
    // End of input closes the session; the plan stays pending.
    assert!(out.contains("Goodbye!"));
    assert_eq!(driver.state().awaiting(), Some(GateKind::Modification));
}

#[tokio::test]
async fn oracle_failures_keep_the_session_alive() {
    let tmp = TempDir::new().unwrap();
    let provider = MockProvider::scripted(vec![
        Err(LlmError::RateLimited {
            provider: "mock".into(),
            retry_after_secs: None,
        }
        .into()),
        Err(anyhow::anyhow!("connection reset by peer")),
        Ok(text("Back online.")),
    ]);
    let mut driver = driver(provider.clone(), &tmp);

    let out = converse(&mut driver, "first\nsecond\nthird\nexit\n").await;
    assert!(out.contains("Rate limit reached. Please wait a moment and try again."));
    assert!(out.contains("connection reset by peer"));
    assert!(out.contains("Agent: Back online."));
    assert_eq!(provider.calls(), 3);
}

#[tokio::test]
async fn single_shot_reports_errors() {
    let tmp = TempDir::new().unwrap();
    let provider = MockProvider::scripted(vec![Err(anyhow::anyhow!("bad gateway"))]);
    let mut driver = driver(provider, &tmp);

    let mut out = Vec::new();
    let result = driver.run_single("list the roles", &mut out).await;
    assert!(result.is_err());
    assert!(String::from_utf8(out).unwrap().contains("bad gateway"));
}

#[tokio::test]
async fn project_instructions_reach_the_system_message() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("AGENT.md"), "Never touch inventory/prod.\n").unwrap();
    let provider = MockProvider::new(vec![text("Noted.")]);
    let mut driver = SessionDriver::new(
        &Config::default(),
        provider.clone(),
        Arc::new(default_registry()),
        SessionContext::open(tmp.path()).unwrap(),
    );

    let out = converse(&mut driver, "hello\n").await;
    assert!(out.contains("Project instructions: AGENT.md"));
    assert!(out.contains("Agent: Noted."));
    let system = provider.seen_messages()[0][0].text_content().unwrap();
    assert!(system.contains("HIGHEST PRIORITY"));
    assert!(system.contains("Never touch inventory/prod."));
}
