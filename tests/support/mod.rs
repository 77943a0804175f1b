#![allow(dead_code)]

use std::collections::VecDeque;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::process::Command;
use std::sync::{Arc, Mutex};

use codewarden::llm::{ContentBlock, Provider, ProviderMessage, ProviderResponse, StopReason};
use codewarden::tools::ToolSpec;
use serde_json::Value;

/// Replays canned responses and records every transcript it is shown.
#[derive(Debug)]
pub struct MockProvider {
    responses: Mutex<VecDeque<anyhow::Result<ProviderResponse>>>,
    seen_messages: Mutex<Vec<Vec<ProviderMessage>>>,
}

impl MockProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Arc<Self> {
        Self::scripted(responses.into_iter().map(Ok).collect())
    }

    pub fn scripted(responses: Vec<anyhow::Result<ProviderResponse>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(VecDeque::from(responses)),
            seen_messages: Mutex::new(Vec::new()),
        })
    }

    pub fn seen_messages(&self) -> Vec<Vec<ProviderMessage>> {
        self.seen_messages
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub fn calls(&self) -> usize {
        self.seen_messages().len()
    }
}

impl Provider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn chat_with_tools<'a>(
        &'a self,
        messages: &'a [ProviderMessage],
        _tools: &'a [ToolSpec],
        _model: &'a str,
        _temperature: f64,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ProviderResponse>> + Send + 'a>> {
        Box::pin(async move {
            self.seen_messages
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push(messages.to_vec());
            self.responses
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .pop_front()
                .unwrap_or_else(|| Err(anyhow::anyhow!("mock provider exhausted")))
        })
    }
}

pub fn text(reply: &str) -> ProviderResponse {
    ProviderResponse::text_only(reply.to_string())
}

pub fn tool_calls(calls: &[(&str, Value)]) -> ProviderResponse {
    let mut response = ProviderResponse::text_only(String::new());
    response.content_blocks = calls
        .iter()
        .enumerate()
        .map(|(i, (name, input))| ContentBlock::ToolUse {
            id: format!("toolu_{i}"),
            name: (*name).to_string(),
            input: input.clone(),
        })
        .collect();
    response.stop_reason = Some(StopReason::ToolUse);
    response
}

/// Text of every tool result in a transcript, in order.
pub fn tool_results(messages: &[ProviderMessage]) -> Vec<(String, bool)> {
    messages
        .iter()
        .flat_map(|m| &m.content)
        .filter_map(|block| match block {
            ContentBlock::ToolResult {
                content, is_error, ..
            } => Some((content.clone(), *is_error)),
            _ => None,
        })
        .collect()
}

pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap();
    assert!(output.status.success(), "git {args:?} failed: {output:?}");
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

pub fn init_repo(dir: &Path) {
    git(dir, &["init", "-q"]);
    git(dir, &["config", "user.email", "test@example.com"]);
    git(dir, &["config", "user.name", "Test"]);
    git(dir, &["config", "commit.gpgsign", "false"]);
    std::fs::write(dir.join("README.md"), "# repo\n").unwrap();
    git(dir, &["add", "."]);
    git(dir, &["commit", "-q", "-m", "init"]);
}
