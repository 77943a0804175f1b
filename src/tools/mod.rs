pub mod ansible;
pub(crate) mod common;
pub mod factory;
pub mod file_ops;
pub mod git_ops;
pub mod python;
pub mod reference_doc;
pub mod registry;
pub mod search;
pub mod shell;
pub mod traits;
pub mod types;

pub use factory::{default_registry, default_tools};
pub use reference_doc::ReferenceDocument;
pub use registry::ToolRegistry;
pub use traits::{ExecutionContext, SourceFile, StagedFile, Tool};
pub use types::{ToolKind, ToolOutcome, ToolPayload, ToolSpec};
