pub mod driver;
pub mod prompt;

pub use driver::{SessionDriver, describe_oracle_error, is_exit_command};
pub use prompt::build_system_prompt;
