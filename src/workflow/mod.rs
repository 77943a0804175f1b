//! The approval-gated edit workflow: proposed changes accumulate in a plan,
//! the human approves or rejects it, and approved commits wait behind a
//! second gate before they are pushed.

pub mod apply;
pub mod diff;
pub mod display;
pub mod gate;
pub mod pending;
pub mod push;
pub mod session;
pub mod turn;

pub use apply::{ApplyReport, ApplyStatus, FileOutcome, apply_plan};
pub use diff::{apply_unified_diff, build_diff, hunk_count, make_pending_change};
pub use display::{render_plan, render_push_request};
pub use gate::{ApprovalGate, Gate, GateKind, GateState, GateTransition, Verdict, classify};
pub use pending::{ChangeKind, PendingChange, Plan, PlanUpdate};
pub use push::{PushRequest, inspect_push, push_branch};
pub use session::{
    PROJECT_INSTRUCTIONS_FILE, SessionContext, SessionState, Transcript, load_project_instructions,
};
pub use turn::{StepOutcome, ToolCallRecord, TurnController, TurnReport, TurnSettings, TurnStop};
