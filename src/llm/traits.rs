use super::types::{ProviderMessage, ProviderResponse};
use crate::tools::ToolSpec;
use std::future::Future;
use std::pin::Pin;

/// The oracle: given a transcript and a tool catalog, returns either a final
/// text answer or a list of requested tool invocations.
///
/// A leading [`MessageRole::System`](super::types::MessageRole::System)
/// message in `messages` is the system prompt; implementations decide how to
/// transmit it. Errors (network, auth, rate limit) are returned, never hidden.
pub trait Provider: Send + Sync {
    /// Provider identifier (e.g. "anthropic").
    fn name(&self) -> &str;

    fn chat_with_tools<'a>(
        &'a self,
        messages: &'a [ProviderMessage],
        tools: &'a [ToolSpec],
        model: &'a str,
        temperature: f64,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ProviderResponse>> + Send + 'a>>;
}
