use super::gate::{Gate, GateKind};
use super::pending::{PendingChange, Plan, PlanUpdate};
use super::push::PushRequest;
use crate::error::ConfigError;
use crate::llm::{MessageRole, ProviderMessage};
use crate::tools::ReferenceDocument;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use uuid::Uuid;

// ── Session context ──────────────────────────────────────────────────────────

/// Project instructions file looked up at the repository root.
pub const PROJECT_INSTRUCTIONS_FILE: &str = "AGENT.md";

/// Where the session runs and what it was started with. Passed down
/// explicitly; nothing reads the process working directory after startup.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub repo_root: PathBuf,
    /// Contents of `AGENT.md` at the repository root.
    pub project_instructions: Option<String>,
    pub reference_docs: Vec<ReferenceDocument>,
}

impl SessionContext {
    pub fn new(repo_root: PathBuf) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            started_at: Utc::now(),
            repo_root,
            project_instructions: None,
            reference_docs: Vec::new(),
        }
    }

    /// Canonicalize and validate the repository root, then pick up its
    /// project instructions.
    pub fn open(repo_path: &Path) -> Result<Self, ConfigError> {
        let display = repo_path.display().to_string();
        let root = repo_path
            .canonicalize()
            .map_err(|_| ConfigError::RepoNotFound(display.clone()))?;
        if !root.is_dir() {
            return Err(ConfigError::RepoNotFound(display));
        }
        let instructions = load_project_instructions(&root);
        Ok(Self::new(root).with_project_instructions(instructions))
    }

    pub fn with_project_instructions(mut self, instructions: Option<String>) -> Self {
        self.project_instructions = instructions;
        self
    }

    pub fn with_references(mut self, docs: Vec<ReferenceDocument>) -> Self {
        self.reference_docs = docs;
        self
    }
}

/// Read `AGENT.md` from `repo_root`. A missing, blank or unreadable file
/// yields `None`.
pub fn load_project_instructions(repo_root: &Path) -> Option<String> {
    let path = repo_root.join(PROJECT_INSTRUCTIONS_FILE);
    match std::fs::read_to_string(&path) {
        Ok(content) if content.trim().is_empty() => None,
        Ok(content) => {
            tracing::info!(
                path = %path.display(),
                chars = content.chars().count(),
                "project instructions loaded"
            );
            Some(content)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no project instructions");
            None
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read project instructions"
            );
            None
        }
    }
}

// ── Transcript ───────────────────────────────────────────────────────────────

/// Ordered conversation. Append-only, except that a system message may be
/// inserted once at the head.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<ProviderMessage>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ProviderMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn push(&mut self, message: ProviderMessage) {
        self.messages.push(message);
    }

    /// Insert the system message at the head unless one is already there.
    /// Returns whether it was inserted.
    pub fn ensure_system(&mut self, prompt: impl FnOnce() -> String) -> bool {
        if self
            .messages
            .first()
            .is_some_and(|m| m.role == MessageRole::System)
        {
            return false;
        }
        self.messages.insert(0, ProviderMessage::system(prompt()));
        true
    }

    /// Text of the most recent human message.
    pub fn latest_user_text(&self) -> Option<String> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
            .and_then(ProviderMessage::text_content)
    }
}

// ── Session state ────────────────────────────────────────────────────────────

/// Everything one session owns: transcript, plan, both gates and the push
/// metadata they guard.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub context: SessionContext,
    pub transcript: Transcript,
    pub plan: Plan,
    pub modification: Gate,
    pub push: Gate,
    /// Metadata for the open push gate.
    pub push_request: Option<PushRequest>,
    /// A push waiting for the modification gate to close.
    queued_push: Option<PushRequest>,
    /// Latest revision request for an open gate.
    pub feedback: Option<String>,
    pub current_branch: Option<String>,
}

impl SessionState {
    pub fn new(context: SessionContext) -> Self {
        Self {
            context,
            transcript: Transcript::new(),
            plan: Plan::new(),
            modification: Gate::default(),
            push: Gate::default(),
            push_request: None,
            queued_push: None,
            feedback: None,
            current_branch: None,
        }
    }

    /// The gate currently waiting on the human, modification first.
    pub fn awaiting(&self) -> Option<GateKind> {
        if self.modification.is_awaiting() {
            Some(GateKind::Modification)
        } else if self.push.is_awaiting() {
            Some(GateKind::Push)
        } else {
            None
        }
    }

    /// Fold a proposed change into the plan and open the modification gate.
    /// A gate that is already awaiting stays open even when the plan empties;
    /// only a human reply closes it.
    pub fn propose(&mut self, change: PendingChange) -> PlanUpdate {
        let file = change.target_path.clone();
        let update = self.plan.add(change);
        tracing::debug!(%file, ?update, plan_len = self.plan.len(), "plan updated");
        if self.plan.is_empty() {
            if self.modification.is_awaiting() {
                tracing::info!(gate = %GateKind::Modification, "plan emptied; gate stays open");
            }
        } else if self.modification.open() {
            tracing::info!(gate = %GateKind::Modification, "gate awaiting approval");
        }
        update
    }

    /// Open the push gate, or queue the request while the modification gate
    /// is awaiting. A newer request replaces an older one.
    pub fn request_push(&mut self, request: PushRequest) {
        if self.modification.is_awaiting() {
            tracing::info!(branch = %request.branch, "push queued behind modification gate");
            self.queued_push = Some(request);
            return;
        }
        tracing::info!(
            gate = %GateKind::Push,
            branch = %request.branch,
            commits = request.commit_count,
            "gate awaiting approval"
        );
        self.current_branch = Some(request.branch.clone());
        self.push_request = Some(request);
        self.push.open();
    }

    pub fn queued_push(&self) -> Option<&PushRequest> {
        self.queued_push.as_ref()
    }

    pub(crate) fn promote_queued_push(&mut self) {
        if let Some(request) = self.queued_push.take() {
            self.request_push(request);
        }
    }
}
