use super::Config;
use super::schema::MAX_ITERATIONS_HARD_CAP;
use crate::error::ConfigError;
use anyhow::{Context, Result};
use directories::UserDirs;
use std::fs;
use std::path::{Path, PathBuf};

impl Config {
    pub fn load_or_init() -> Result<Self> {
        let home = UserDirs::new()
            .map(|u| u.home_dir().to_path_buf())
            .context("Could not find home directory")?;
        let codewarden_dir = home.join(".codewarden");
        let config_path = codewarden_dir.join("config.toml");

        if !codewarden_dir.exists() {
            fs::create_dir_all(&codewarden_dir)
                .context("Failed to create .codewarden directory")?;
        }

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Self {
                config_path,
                ..Self::default()
            };
            config.save()?;
            Ok(config)
        }
    }

    /// Load an explicit config file. Missing files are an error here, unlike
    /// [`Config::load_or_init`].
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: Config =
            toml::from_str(&contents).context("Failed to parse config file")?;
        config.config_path = path.to_path_buf();
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&self.config_path, toml_str).context("Failed to write config file")?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::Validation(format!(
                "temperature must be within 0.0..=2.0, got {}",
                self.temperature
            )));
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::Validation("model must not be empty".into()));
        }
        if self.workflow.max_iterations == 0 {
            return Err(ConfigError::Validation(
                "workflow.max_iterations must be at least 1".into(),
            ));
        }
        if self.tools.shell_timeout_secs == 0 || self.tools.git_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "tool timeouts must be at least 1 second".into(),
            ));
        }
        Ok(())
    }

    /// Iteration budget actually enforced, clamped to the hard cap.
    pub fn effective_max_iterations(&self) -> u32 {
        self.workflow.max_iterations.min(MAX_ITERATIONS_HARD_CAP)
    }

    /// Resolve the repository root: `~` expanded, must be an existing directory.
    /// Without a configured path, the nearest git checkout containing the
    /// working directory is used, else the working directory itself.
    pub fn resolve_repo_root(&self) -> Result<PathBuf, ConfigError> {
        let raw = match self.repo_path.as_deref() {
            Some(path) if !path.trim().is_empty() => {
                PathBuf::from(shellexpand::tilde(path.trim()).into_owned())
            }
            _ => {
                let cwd = std::env::current_dir()?;
                match find_repo_root(&cwd) {
                    Some(root) => {
                        tracing::info!(repo = %root.display(), "auto-detected repository root");
                        root
                    }
                    None => cwd,
                }
            }
        };
        if !raw.is_dir() {
            return Err(ConfigError::RepoNotFound(raw.display().to_string()));
        }
        Ok(raw.canonicalize()?)
    }
}

/// Walk up from `start` to the first directory holding a `.git` entry.
/// A `.git` file (worktrees, submodules) counts too.
pub fn find_repo_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(".git").exists())
        .map(Path::to_path_buf)
}
