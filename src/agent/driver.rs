//! Session driver: feeds human input to the turn controller and prints the
//! reply together with whichever gate is waiting.

use super::prompt::build_system_prompt;
use crate::config::Config;
use crate::error::LlmError;
use crate::llm::Provider;
use crate::tools::{ExecutionContext, ToolRegistry};
use crate::workflow::{
    GateKind, PROJECT_INSTRUCTIONS_FILE, SessionContext, SessionState, TurnController,
    TurnReport, TurnSettings, TurnStop, render_plan, render_push_request,
};
use anyhow::Result;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

const EXIT_COMMANDS: &[&str] = &["quit", "exit", "q"];
const RATE_LIMIT_MESSAGE: &str = "Rate limit reached. Please wait a moment and try again.";

/// Whether a line of input ends the session.
pub fn is_exit_command(input: &str) -> bool {
    EXIT_COMMANDS.contains(&input.trim().to_lowercase().as_str())
}

/// The message shown to the human when the oracle call fails.
pub fn describe_oracle_error(err: &anyhow::Error) -> String {
    let rate_limited = err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<LlmError>(),
            Some(LlmError::RateLimited { .. })
        )
    });
    if rate_limited {
        RATE_LIMIT_MESSAGE.to_string()
    } else {
        format!("Sorry, something went wrong talking to the model: {err:#}")
    }
}

pub struct SessionDriver {
    controller: TurnController,
    state: SessionState,
}

impl SessionDriver {
    pub fn new(
        config: &Config,
        provider: Arc<dyn Provider>,
        registry: Arc<ToolRegistry>,
        context: SessionContext,
    ) -> Self {
        let system_prompt = build_system_prompt(
            context.project_instructions.as_deref(),
            &context.reference_docs,
            config.workflow.reference_char_limit,
        );
        let ctx = ExecutionContext::from_config(context.repo_root.clone(), config);
        let controller = TurnController::new(
            provider,
            registry,
            ctx,
            TurnSettings::from_config(config),
            system_prompt,
        );
        Self {
            controller,
            state: SessionState::new(context),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Run one turn and render everything the human should see afterwards.
    pub async fn respond(&mut self, input: &str) -> Result<String> {
        let report = self.controller.run_turn(&mut self.state, input).await?;
        Ok(self.render(&report))
    }

    fn render(&self, report: &TurnReport) -> String {
        let mut out = String::new();
        if !report.reply.trim().is_empty() {
            out.push_str("Agent: ");
            out.push_str(report.reply.trim());
        }
        if report.stop == TurnStop::MaxIterations && report.reply.trim().is_empty() {
            out.push_str("Agent: (stopped at the tool iteration limit)");
        }

        let settings = self.controller.settings();
        let gate = match self.state.awaiting() {
            Some(GateKind::Modification) => Some(render_plan(
                self.state.plan.changes(),
                settings.diff_preview_lines,
            )),
            Some(GateKind::Push) => self
                .state
                .push_request
                .as_ref()
                .map(|request| render_push_request(request, settings.push_file_cap)),
            None => None,
        };
        if let Some(gate) = gate {
            if !out.is_empty() {
                out.push_str("\n\n");
            }
            out.push_str(&gate);
        }
        out
    }

    /// Single-shot mode: one turn, reply printed, oracle errors returned.
    pub async fn run_single<W: AsyncWrite + Unpin>(
        &mut self,
        query: &str,
        out: &mut W,
    ) -> Result<()> {
        match self.respond(query).await {
            Ok(text) => {
                out.write_all(format!("{text}\n").as_bytes()).await?;
                out.flush().await?;
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "oracle call failed");
                out.write_all(format!("{}\n", describe_oracle_error(&e)).as_bytes())
                    .await?;
                out.flush().await?;
                Err(e)
            }
        }
    }

    /// Interactive mode: read lines until an exit command or end of input.
    /// Oracle errors are reported and the session continues.
    pub async fn run_interactive<R, W>(&mut self, input: R, out: &mut W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        out.write_all(self.banner().as_bytes()).await?;
        let mut lines = input.lines();
        loop {
            out.write_all(b"You: ").await?;
            out.flush().await?;
            let Some(line) = lines.next_line().await? else {
                out.write_all(b"\nGoodbye!\n").await?;
                break;
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if is_exit_command(line) {
                out.write_all(b"Goodbye!\n").await?;
                break;
            }

            let text = match self.respond(line).await {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(error = %e, "oracle call failed");
                    describe_oracle_error(&e)
                }
            };
            out.write_all(format!("\n{text}\n\n").as_bytes()).await?;
        }
        out.flush().await?;
        tracing::info!(
            session = %self.state.context.session_id,
            messages = self.state.transcript.len(),
            "session ended"
        );
        Ok(())
    }

    fn banner(&self) -> String {
        let rule = "=".repeat(60);
        let mut lines = vec![
            rule.clone(),
            "Codewarden: approval-gated coding agent".to_string(),
            rule.clone(),
            format!("Repository: {}", self.state.context.repo_root.display()),
        ];
        if self.state.context.project_instructions.is_some() {
            lines.push(format!("Project instructions: {PROJECT_INSTRUCTIONS_FILE}"));
        }
        for doc in &self.state.context.reference_docs {
            lines.push(format!(
                "Reference loaded: {}",
                doc.title.as_deref().unwrap_or(&doc.path)
            ));
        }
        lines.extend([
            "Commands:".to_string(),
            "  - Type your request to interact with the agent".to_string(),
            "  - 'approve' / 'reject' for pending changes".to_string(),
            "  - 'push' / 'cancel' for a pending push".to_string(),
            "  - 'quit' or 'exit' to exit".to_string(),
            rule,
            String::new(),
        ]);
        lines.join("\n") + "\n"
    }
}
