use super::anthropic::AnthropicProvider;
use super::traits::Provider;
use crate::config::Config;
use crate::error::LlmError;
use std::sync::Arc;

/// Build the oracle named by `config.provider`.
pub fn create_provider(config: &Config) -> Result<Arc<dyn Provider>, LlmError> {
    match config.provider.trim().to_ascii_lowercase().as_str() {
        "anthropic" | "claude" => Ok(Arc::new(
            AnthropicProvider::with_base_url(config.api_key.as_deref(), config.base_url.as_deref())
                .with_max_tokens(config.max_tokens),
        )),
        other => Err(LlmError::UnknownProvider(other.to_string())),
    }
}
