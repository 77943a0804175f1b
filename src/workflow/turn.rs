use super::apply::apply_plan;
use super::display::{render_plan, render_push_request};
use super::gate::{ApprovalGate, GateKind, GateTransition};
use super::pending::PendingChange;
use super::push::{inspect_push, push_branch};
use super::session::SessionState;
use crate::config::Config;
use crate::llm::{Provider, ProviderMessage, ProviderResponse};
use crate::tools::common::preview;
use crate::tools::{ExecutionContext, ToolKind, ToolOutcome, ToolPayload, ToolRegistry};
use std::sync::Arc;

// ── Settings ─────────────────────────────────────────────────────────────────

const ARGS_LOG_CHARS: usize = 200;
const OUTPUT_LOG_CHARS: usize = 500;

#[derive(Debug, Clone)]
pub struct TurnSettings {
    pub model: String,
    pub temperature: f64,
    pub max_iterations: u32,
    pub remote: String,
    pub diff_preview_lines: usize,
    pub push_file_cap: usize,
}

impl TurnSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_iterations: config.effective_max_iterations(),
            remote: config.workflow.remote.clone(),
            diff_preview_lines: config.workflow.diff_preview_lines,
            push_file_cap: config.workflow.push_file_cap,
        }
    }
}

impl Default for TurnSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

// ── Results ──────────────────────────────────────────────────────────────────

/// One tool invocation made during a turn.
#[derive(Debug, Clone)]
pub struct ToolCallRecord {
    pub name: String,
    pub args: serde_json::Value,
    pub outcome: ToolOutcome,
}

/// What a single oracle round-trip produced.
#[derive(Debug, Clone)]
pub enum StepOutcome {
    /// The oracle answered in text; the turn is over.
    Reply(String),
    /// The oracle requested tools; they ran and their results are in the
    /// transcript.
    ToolsExecuted(Vec<ToolCallRecord>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStop {
    Completed,
    MaxIterations,
}

#[derive(Debug, Clone)]
pub struct TurnReport {
    pub reply: String,
    pub transition: GateTransition,
    pub tool_calls: Vec<ToolCallRecord>,
    pub iterations: u32,
    pub stop: TurnStop,
}

// ── Controller ───────────────────────────────────────────────────────────────

/// Advances a session one human→assistant exchange at a time.
pub struct TurnController {
    provider: Arc<dyn Provider>,
    registry: Arc<ToolRegistry>,
    ctx: ExecutionContext,
    settings: TurnSettings,
    system_prompt: String,
}

impl TurnController {
    pub fn new(
        provider: Arc<dyn Provider>,
        registry: Arc<ToolRegistry>,
        ctx: ExecutionContext,
        settings: TurnSettings,
        system_prompt: String,
    ) -> Self {
        Self {
            provider,
            registry,
            ctx,
            settings,
            system_prompt,
        }
    }

    pub fn settings(&self) -> &TurnSettings {
        &self.settings
    }

    /// Handle one human message: resolve any open gate, carry out what an
    /// approval allows, then let the oracle work until it answers in text.
    ///
    /// Oracle failures propagate; the session state stays usable.
    pub async fn run_turn(
        &mut self,
        state: &mut SessionState,
        input: &str,
    ) -> anyhow::Result<TurnReport> {
        self.ensure_system(state);
        state.transcript.push(ProviderMessage::user(input));

        let transition = ApprovalGate::evaluate(state, Some(input));
        self.settle(state, &transition).await;

        let mut tool_calls = Vec::new();
        let mut iterations = 0;
        loop {
            if iterations >= self.settings.max_iterations {
                tracing::warn!(iterations, "tool iteration limit reached");
                return Ok(TurnReport {
                    reply: format!(
                        "Stopped after {iterations} tool iterations without a final answer."
                    ),
                    transition,
                    tool_calls,
                    iterations,
                    stop: TurnStop::MaxIterations,
                });
            }
            iterations += 1;
            match self.step(state).await? {
                StepOutcome::Reply(reply) => {
                    return Ok(TurnReport {
                        reply,
                        transition,
                        tool_calls,
                        iterations,
                        stop: TurnStop::Completed,
                    });
                }
                StepOutcome::ToolsExecuted(records) => tool_calls.extend(records),
            }
        }
    }

    /// One oracle round-trip: system message, gate reminder, oracle call,
    /// tools in request order, pending changes folded into the plan.
    pub async fn step(&mut self, state: &mut SessionState) -> anyhow::Result<StepOutcome> {
        self.ensure_system(state);

        let mut outbound = state.transcript.messages().to_vec();
        if let Some(reminder) = self.gate_reminder(state) {
            outbound.push(ProviderMessage::system(reminder));
        }

        let specs = self.registry.specs();
        let response: ProviderResponse = self
            .provider
            .chat_with_tools(
                &outbound,
                &specs,
                &self.settings.model,
                self.settings.temperature,
            )
            .await?;
        state.transcript.push(response.to_assistant_message());

        if !response.has_tool_use() {
            return Ok(StepOutcome::Reply(response.text.clone()));
        }

        let mut records = Vec::new();
        for call in response.tool_calls() {
            tracing::info!(
                tool = call.name,
                args = %preview(&call.input.to_string(), ARGS_LOG_CHARS),
                "tool call"
            );
            self.ctx.staged = state.plan.staged_files();
            let outcome = self
                .registry
                .execute(call.name, call.input.clone(), &self.ctx)
                .await;
            let rendered = outcome.render();
            tracing::info!(
                tool = call.name,
                ok = !outcome.is_err(),
                output = %preview(&rendered, OUTPUT_LOG_CHARS),
                "tool result"
            );
            state
                .transcript
                .push(ProviderMessage::tool_result(call.id, rendered, outcome.is_err()));

            self.fold_outcome(state, call.name, &outcome).await;
            records.push(ToolCallRecord {
                name: call.name.to_string(),
                args: call.input.clone(),
                outcome,
            });
        }
        Ok(StepOutcome::ToolsExecuted(records))
    }

    fn ensure_system(&self, state: &mut SessionState) {
        if state.transcript.ensure_system(|| self.system_prompt.clone()) {
            tracing::debug!(session = %state.context.session_id, "system message inserted");
        }
    }

    /// Route a tool result into session state: proposals join the plan, a
    /// successful commit asks for push approval.
    async fn fold_outcome(&self, state: &mut SessionState, name: &str, outcome: &ToolOutcome) {
        if let Some(value) = outcome.payload().and_then(ToolPayload::pending_change) {
            match PendingChange::from_payload(value) {
                Ok(change) => {
                    state.propose(change);
                }
                Err(e) => tracing::warn!(tool = name, error = %e, "skipping malformed pending change"),
            }
        }

        if name == ToolKind::GitCommit.as_str() && !outcome.is_err() {
            match inspect_push(&self.ctx).await {
                Ok(request) if request.commit_count > 0 => state.request_push(request),
                Ok(_) => tracing::debug!("commit left nothing to push"),
                Err(e) => tracing::warn!(error = %e, "could not inspect commits for push"),
            }
        }
    }

    fn gate_reminder(&self, state: &SessionState) -> Option<String> {
        let feedback = state
            .feedback
            .as_deref()
            .map(|f| format!("\nThe user asked for revisions: \"{f}\"\n"))
            .unwrap_or_default();
        match state.awaiting()? {
            GateKind::Modification => Some(format!(
                "You have pending changes awaiting user approval. Do not apply them. \
                 Wait for the user to approve, reject, or request modifications; \
                 proposing a file again replaces its planned content.\n{feedback}\n{}",
                render_plan(state.plan.changes(), self.settings.diff_preview_lines)
            )),
            GateKind::Push => {
                let request = state.push_request.as_ref()?;
                Some(format!(
                    "Changes have been committed. Awaiting push approval for branch '{}'. \
                     Pushing happens only when the user approves.\n{feedback}\n{}",
                    request.branch,
                    render_push_request(request, self.settings.push_file_cap)
                ))
            }
        }
    }

    /// Carry out the side effects a gate decision allows and report them to
    /// the oracle as context messages.
    async fn settle(&self, state: &mut SessionState, transition: &GateTransition) {
        let note = match transition {
            GateTransition::Unchanged | GateTransition::Feedback { .. } => return,
            GateTransition::ModificationApproved(changes) => {
                let report = apply_plan(&self.ctx.repo_root, changes).await;
                format!(
                    "The user approved the modification plan.\n{}\n\
                     Stage and commit the applied files when appropriate.",
                    report.render()
                )
            }
            GateTransition::ModificationRejected { discarded } => format!(
                "The user rejected the modification plan. {discarded} pending change(s) \
                 were discarded and nothing was written."
            ),
            GateTransition::PushApproved(request) => {
                match push_branch(&self.ctx, &self.settings.remote, request).await {
                    Ok(message) => format!("The user approved the push. {message}"),
                    Err(e) => format!("The user approved the push, but it failed: {e}"),
                }
            }
            GateTransition::PushRejected(request) => format!(
                "The user declined to push branch '{}'. The commits stay local.",
                request.branch
            ),
        };
        tracing::info!(note = %preview(&note, OUTPUT_LOG_CHARS), "gate settled");
        state.transcript.push(ProviderMessage::system(note));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToolError;
    use crate::llm::{ContentBlock, MessageRole, StopReason};
    use crate::tools::{Tool, ToolSpec};
    use crate::workflow::{ChangeKind, GateState, SessionContext, make_pending_change};
    use serde_json::{Value, json};
    use std::collections::VecDeque;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct ScriptedProvider {
        responses: Mutex<VecDeque<ProviderResponse>>,
        seen: Mutex<Vec<Vec<ProviderMessage>>>,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<ProviderResponse>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        fn chat_with_tools<'a>(
            &'a self,
            messages: &'a [ProviderMessage],
            _tools: &'a [ToolSpec],
            _model: &'a str,
            _temperature: f64,
        ) -> Pin<Box<dyn Future<Output = anyhow::Result<ProviderResponse>> + Send + 'a>> {
            Box::pin(async move {
                self.seen.lock().unwrap().push(messages.to_vec());
                self.responses
                    .lock()
                    .unwrap()
                    .pop_front()
                    .ok_or_else(|| anyhow::anyhow!("script exhausted"))
            })
        }
    }

    fn tool_use(calls: &[(&str, Value)]) -> ProviderResponse {
        ProviderResponse {
            content_blocks: calls
                .iter()
                .enumerate()
                .map(|(i, (name, input))| ContentBlock::ToolUse {
                    id: format!("call_{i}"),
                    name: (*name).to_string(),
                    input: input.clone(),
                })
                .collect(),
            stop_reason: Some(StopReason::ToolUse),
            ..ProviderResponse::text_only(String::new())
        }
    }

    struct ProposeTool;

    impl Tool for ProposeTool {
        fn kind(&self) -> ToolKind {
            ToolKind::WriteFile
        }

        fn description(&self) -> &str {
            "propose"
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
                if args.get("malformed").is_some() {
                    return Ok(ToolPayload::Structured(json!({"diff": 7})));
                }
                let file = args["file"].as_str().unwrap_or("a.py").to_string();
                let change =
                    make_pending_change(file, "x\n", "y\n", "swap", ChangeKind::Modify);
                Ok(ToolPayload::Structured(change.to_value()))
            })
        }
    }

    fn controller(provider: Arc<ScriptedProvider>, root: &std::path::Path) -> TurnController {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(ProposeTool));
        TurnController::new(
            provider,
            Arc::new(registry),
            ExecutionContext::new(root),
            TurnSettings::default(),
            "You are careful.".into(),
        )
    }

    fn state(root: &std::path::Path) -> SessionState {
        SessionState::new(SessionContext::new(root.to_path_buf()))
    }

    #[tokio::test]
    async fn proposals_open_the_gate_in_request_order() {
        let tmp = TempDir::new().unwrap();
        let provider = ScriptedProvider::new(vec![
            tool_use(&[
                ("write_file", json!({"file": "b.py"})),
                ("write_file", json!({"file": "a.py"})),
            ]),
            ProviderResponse::text_only("Here is the plan.".into()),
        ]);
        let mut turn = controller(provider.clone(), tmp.path());
        let mut state = state(tmp.path());

        let report = turn.run_turn(&mut state, "edit both").await.unwrap();
        assert_eq!(report.reply, "Here is the plan.");
        assert_eq!(report.iterations, 2);
        assert_eq!(report.tool_calls.len(), 2);
        assert_eq!(state.modification.state(), GateState::Awaiting);
        let order: Vec<&str> = state.plan.iter().map(|c| c.target_path.as_str()).collect();
        assert_eq!(order, ["b.py", "a.py"]);

        // The second oracle call sees the tool results in request order.
        let seen = provider.seen.lock().unwrap();
        let ids: Vec<&str> = seen[1]
            .iter()
            .filter(|m| m.role == MessageRole::Tool)
            .flat_map(|m| &m.content)
            .filter_map(|b| match b {
                ContentBlock::ToolResult { tool_use_id, .. } => Some(tool_use_id.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(ids, ["call_0", "call_1"]);
        // ...and the reminder for the now-open gate.
        let reminder = seen[1].last().unwrap();
        assert_eq!(reminder.role, MessageRole::System);
        assert!(reminder.text_content().unwrap().contains("awaiting user approval"));
    }

    #[tokio::test]
    async fn reminder_is_not_persisted() {
        let tmp = TempDir::new().unwrap();
        let provider = ScriptedProvider::new(vec![ProviderResponse::text_only("ok".into())]);
        let mut turn = controller(provider.clone(), tmp.path());
        let mut state = state(tmp.path());
        state.propose(make_pending_change("a.py", "x\n", "y\n", "swap", ChangeKind::Modify));

        turn.run_turn(&mut state, "what is pending?").await.unwrap();
        let roles: Vec<MessageRole> = state.transcript.messages().iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            [MessageRole::System, MessageRole::User, MessageRole::Assistant]
        );
        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen[0].len(), 3);
    }

    #[tokio::test]
    async fn malformed_and_unknown_results_do_not_break_the_turn() {
        let tmp = TempDir::new().unwrap();
        let provider = ScriptedProvider::new(vec![
            tool_use(&[
                ("write_file", json!({"malformed": true})),
                ("git_push", json!({})),
            ]),
            ProviderResponse::text_only("done".into()),
        ]);
        let mut turn = controller(provider, tmp.path());
        let mut state = state(tmp.path());

        let report = turn.run_turn(&mut state, "go").await.unwrap();
        assert_eq!(report.stop, TurnStop::Completed);
        assert!(state.plan.is_empty());
        assert_eq!(state.modification.state(), GateState::Closed);
        assert_eq!(
            report.tool_calls[1].outcome,
            ToolOutcome::Err("Tool not found: git_push".into())
        );
    }

    #[tokio::test]
    async fn approval_applies_the_plan_before_the_oracle_runs() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.py"), "x\n").unwrap();
        let provider = ScriptedProvider::new(vec![ProviderResponse::text_only("applied".into())]);
        let mut turn = controller(provider.clone(), tmp.path());
        let mut state = state(tmp.path());
        state.propose(make_pending_change("a.py", "x\n", "y\n", "swap", ChangeKind::Modify));

        let report = turn.run_turn(&mut state, "approve").await.unwrap();
        assert!(matches!(report.transition, GateTransition::ModificationApproved(_)));
        assert_eq!(std::fs::read_to_string(tmp.path().join("a.py")).unwrap(), "y\n");
        let seen = provider.seen.lock().unwrap();
        let note = seen[0].last().unwrap().text_content().unwrap();
        assert!(note.contains("Applied 1/1"));
    }

    #[tokio::test]
    async fn iteration_cap_ends_the_turn() {
        let tmp = TempDir::new().unwrap();
        let provider = ScriptedProvider::new(vec![
            tool_use(&[("write_file", json!({"file": "a.py"}))]),
            tool_use(&[("write_file", json!({"file": "b.py"}))]),
        ]);
        let mut turn = controller(provider, tmp.path());
        turn.settings.max_iterations = 2;
        let mut state = state(tmp.path());

        let report = turn.run_turn(&mut state, "loop").await.unwrap();
        assert_eq!(report.stop, TurnStop::MaxIterations);
        assert_eq!(report.iterations, 2);
        assert_eq!(state.plan.len(), 2);
    }

    #[tokio::test]
    async fn oracle_errors_propagate_and_keep_the_plan() {
        let tmp = TempDir::new().unwrap();
        let provider = ScriptedProvider::new(vec![]);
        let mut turn = controller(provider, tmp.path());
        let mut state = state(tmp.path());
        state.propose(make_pending_change("a.py", "x\n", "y\n", "swap", ChangeKind::Modify));

        let err = turn.run_turn(&mut state, "tweak it").await.unwrap_err();
        assert!(err.to_string().contains("script exhausted"));
        assert_eq!(state.plan.len(), 1);
        assert!(state.modification.is_awaiting());
    }
}
