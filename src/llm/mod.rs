pub mod anthropic;
pub mod factory;
pub mod http;
pub mod traits;
pub mod types;

pub use anthropic::AnthropicProvider;
pub use factory::create_provider;
pub use traits::Provider;
pub use types::{
    ContentBlock, MessageRole, ProviderMessage, ProviderResponse, StopReason, ToolCall,
};
