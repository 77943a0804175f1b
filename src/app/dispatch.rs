use crate::agent::SessionDriver;
use crate::cli::Cli;
use crate::config::Config;
use crate::llm::create_provider;
use crate::tools::{default_registry, reference_doc};
use crate::workflow::SessionContext;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

/// Load configuration and layer overrides: file, then environment, then CLI.
pub fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match cli.config.as_deref() {
        Some(path) => Config::load_from(path)?,
        None => Config::load_or_init()?,
    };
    config.apply_env_overrides();
    apply_cli_overrides(&mut config, cli);
    config.validate()?;
    Ok(config)
}

fn apply_cli_overrides(config: &mut Config, cli: &Cli) {
    if let Some(repo) = &cli.repo {
        config.repo_path = Some(repo.clone());
    }
    if let Some(model) = &cli.model {
        config.model = model.clone();
    }
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
}

/// Resolve the repository, load references, build the session and run it.
pub async fn dispatch(cli: Cli, config: Config) -> Result<()> {
    let repo_root = config.resolve_repo_root()?;
    let mut references = Vec::with_capacity(cli.references.len());
    for path in &cli.references {
        let doc = reference_doc::load(path)
            .await
            .with_context(|| format!("Failed to load reference document {}", path.display()))?;
        info!(path = %path.display(), stats = %doc.stats(), "reference document loaded");
        references.push(doc);
    }
    let context = SessionContext::open(&repo_root)?.with_references(references);
    info!(
        session = %context.session_id,
        repo = %context.repo_root.display(),
        provider = %config.provider,
        model = %config.model,
        "session starting"
    );

    let provider = create_provider(&config)?;
    let registry = Arc::new(default_registry());
    let mut driver = SessionDriver::new(&config, provider, registry, context);

    let mut stdout = tokio::io::stdout();
    match cli.query.as_deref() {
        Some(query) => driver.run_single(query, &mut stdout).await,
        None => {
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            driver.run_interactive(stdin, &mut stdout).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;

    #[test]
    fn cli_overrides_win_over_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "model = \"from-file\"\nrepo_path = \"/srv/repo\"\n").unwrap();
        let cli = Cli::parse_from([
            "codewarden",
            "--config",
            path.to_str().unwrap(),
            "--model",
            "from-cli",
        ]);

        let mut config = Config::load_from(&path).unwrap();
        apply_cli_overrides(&mut config, &cli);
        assert_eq!(config.model, "from-cli");
        assert_eq!(config.repo_path.as_deref(), Some("/srv/repo"));
    }
}
