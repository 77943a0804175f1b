//! Human approval gates.
//!
//! Two independent gates guard side effects: the modification gate blocks
//! writing planned edits to disk, the push gate blocks publishing commits.
//! A gate leaves `Awaiting` only through [`ApprovalGate::evaluate`].

use super::pending::PendingChange;
use super::push::PushRequest;
use super::session::SessionState;

// ── Vocabularies ─────────────────────────────────────────────────────────────

const MODIFICATION_APPROVE: &[&str] = &["approve", "yes", "proceed", "ok", "go ahead", "lgtm"];
const MODIFICATION_REJECT: &[&str] = &["reject", "no", "cancel", "abort"];
const PUSH_APPROVE: &[&str] = &["push", "yes", "proceed", "ok", "go ahead"];
const PUSH_REJECT: &[&str] = &["cancel", "no", "skip", "abort"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum GateKind {
    Modification,
    Push,
}

/// What a human reply means for an open gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Approve,
    Reject,
    /// Anything else: kept verbatim as revision feedback.
    Feedback(String),
}

/// Classify a reply against a gate's vocabulary. Exact match after trimming
/// and lowercasing; "yes but first fix X" is feedback, not approval.
pub fn classify(kind: GateKind, utterance: &str) -> Verdict {
    let normalized = utterance.trim().to_lowercase();
    let (approve, reject) = match kind {
        GateKind::Modification => (MODIFICATION_APPROVE, MODIFICATION_REJECT),
        GateKind::Push => (PUSH_APPROVE, PUSH_REJECT),
    };
    if approve.contains(&normalized.as_str()) {
        Verdict::Approve
    } else if reject.contains(&normalized.as_str()) {
        Verdict::Reject
    } else {
        Verdict::Feedback(utterance.trim().to_string())
    }
}

// ── Gate state ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum GateState {
    #[default]
    Closed,
    Awaiting,
    Approved,
    Rejected,
}

/// One gate: `Closed → Awaiting → {Approved, Rejected}`. Approved and
/// rejected are closed states that remember how the gate was last left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Gate {
    state: GateState,
}

impl Gate {
    pub fn state(self) -> GateState {
        self.state
    }

    pub fn is_awaiting(self) -> bool {
        self.state == GateState::Awaiting
    }

    pub fn approved(self) -> bool {
        self.state == GateState::Approved
    }

    /// Open the gate. Returns `false` if it was already awaiting.
    pub fn open(&mut self) -> bool {
        let was_open = self.is_awaiting();
        self.state = GateState::Awaiting;
        !was_open
    }

    fn resolve(&mut self, approved: bool) {
        self.state = if approved {
            GateState::Approved
        } else {
            GateState::Rejected
        };
    }
}

// ── Evaluation ───────────────────────────────────────────────────────────────

/// State delta produced by one human reply.
#[derive(Debug, Clone, PartialEq)]
pub enum GateTransition {
    /// No gate open, or no human reply yet.
    Unchanged,
    /// The plan is handed over for application.
    ModificationApproved(Vec<PendingChange>),
    ModificationRejected { discarded: usize },
    PushApproved(PushRequest),
    PushRejected(PushRequest),
    /// The gate stays open; the reply is kept for the next oracle call.
    Feedback { gate: GateKind, feedback: String },
}

pub struct ApprovalGate;

impl ApprovalGate {
    /// Apply the latest human reply to whichever gate is awaiting. The
    /// modification gate is consulted first. Never performs I/O.
    pub fn evaluate(state: &mut SessionState, utterance: Option<&str>) -> GateTransition {
        let Some(utterance) = utterance.filter(|u| !u.trim().is_empty()) else {
            return GateTransition::Unchanged;
        };

        if state.modification.is_awaiting() {
            let transition = match classify(GateKind::Modification, utterance) {
                Verdict::Approve => {
                    state.modification.resolve(true);
                    GateTransition::ModificationApproved(state.plan.take())
                }
                Verdict::Reject => {
                    state.modification.resolve(false);
                    GateTransition::ModificationRejected {
                        discarded: state.plan.clear(),
                    }
                }
                Verdict::Feedback(feedback) => {
                    state.feedback = Some(feedback.clone());
                    return GateTransition::Feedback {
                        gate: GateKind::Modification,
                        feedback,
                    };
                }
            };
            state.feedback = None;
            state.promote_queued_push();
            tracing::info!(
                gate = %GateKind::Modification,
                state = %state.modification.state(),
                "gate resolved"
            );
            return transition;
        }

        if state.push.is_awaiting() {
            let verdict = classify(GateKind::Push, utterance);
            let Some(request) = state.push_request.clone() else {
                // Awaiting without metadata cannot be acted on.
                state.push.resolve(false);
                return GateTransition::Unchanged;
            };
            let transition = match verdict {
                Verdict::Approve => {
                    state.push.resolve(true);
                    GateTransition::PushApproved(request)
                }
                Verdict::Reject => {
                    state.push.resolve(false);
                    GateTransition::PushRejected(request)
                }
                Verdict::Feedback(feedback) => {
                    state.feedback = Some(feedback.clone());
                    return GateTransition::Feedback {
                        gate: GateKind::Push,
                        feedback,
                    };
                }
            };
            state.feedback = None;
            state.push_request = None;
            tracing::info!(gate = %GateKind::Push, state = %state.push.state(), "gate resolved");
            return transition;
        }

        GateTransition::Unchanged
    }
}
