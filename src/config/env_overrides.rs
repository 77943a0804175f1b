use super::Config;

impl Config {
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    /// Apply overrides from an arbitrary variable source. Empty values are ignored.
    pub(crate) fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |primary: &str, fallback: Option<&str>| {
            lookup(primary)
                .filter(|v| !v.is_empty())
                .or_else(|| fallback.and_then(&lookup).filter(|v| !v.is_empty()))
        };

        if let Some(key) = var("CODEWARDEN_API_KEY", Some("ANTHROPIC_API_KEY")) {
            self.api_key = Some(key);
        }

        if let Some(model) = var("CODEWARDEN_MODEL", Some("LLM_NAME")) {
            self.model = model;
        }

        if let Some(repo) = var("CODEWARDEN_REPO", Some("REPO_PATH")) {
            self.repo_path = Some(repo);
        }

        if let Some(level) = var("LOG_LEVEL", None) {
            self.log_level = level;
        }

        if let Some(url) = var("CODEWARDEN_BASE_URL", None) {
            self.base_url = Some(url);
        }

        if let Some(temp) = var("CODEWARDEN_TEMPERATURE", None)
            .and_then(|raw| raw.parse::<f64>().ok())
            .filter(|temp| (0.0..=2.0).contains(temp))
        {
            self.temperature = temp;
        }
    }
}
