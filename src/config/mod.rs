mod env_overrides;
mod loader;
pub mod schema;

pub use loader::find_repo_root;
pub use schema::{Config, MAX_ITERATIONS_HARD_CAP, ToolsConfig, WorkflowConfig};
