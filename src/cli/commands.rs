use clap::Parser;
use std::path::PathBuf;

/// `Codewarden` - approval-gated coding agent for Python and Ansible repositories.
#[derive(Parser, Debug)]
#[command(name = "codewarden")]
#[command(version)]
#[command(
    about = "A coding agent that proposes changes and waits for your approval.",
    long_about = None
)]
pub struct Cli {
    /// Config file (default: ~/.codewarden/config.toml, created on first run)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Repository to work in (default: configured repo_path, else the current directory)
    #[arg(short, long)]
    pub repo: Option<String>,

    /// Single query mode (don't enter interactive mode)
    #[arg(short, long)]
    pub query: Option<String>,

    /// Reference document to load into the system context (repeatable)
    #[arg(long = "reference", value_name = "PATH")]
    pub references: Vec<PathBuf>,

    /// Model to use
    #[arg(long)]
    pub model: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}
