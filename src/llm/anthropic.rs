use super::http::api_error;
use super::traits::Provider;
use super::types::{ContentBlock, MessageRole, ProviderMessage, ProviderResponse, StopReason};
use crate::error::LlmError;
use crate::tools::ToolSpec;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Messages API with native tool use.
pub struct AnthropicProvider {
    api_key: Option<String>,
    messages_url: String,
    max_tokens: u32,
    client: Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<AnthropicToolDef>>,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: Vec<InputContentBlock>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum InputContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
}

#[derive(Debug, Serialize)]
struct AnthropicToolDef {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    content: Vec<ResponseContentBlock>,
    stop_reason: Option<String>,
    usage: Option<Usage>,
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(other)]
    Unsupported,
}

impl AnthropicProvider {
    pub fn new(api_key: Option<&str>) -> Self {
        Self::with_base_url(api_key, None)
    }

    pub fn with_base_url(api_key: Option<&str>, base_url: Option<&str>) -> Self {
        let base = base_url.map_or(DEFAULT_BASE_URL, |u| u.trim_end_matches('/'));
        Self {
            api_key: api_key
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(ToString::to_string),
            messages_url: format!("{base}/v1/messages"),
            max_tokens: 8192,
            client: Client::builder()
                .timeout(Duration::from_secs(300))
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn api_role(role: MessageRole) -> &'static str {
        match role {
            MessageRole::Assistant => "assistant",
            MessageRole::User | MessageRole::System | MessageRole::Tool => "user",
        }
    }

    fn convert_block(role: MessageRole, block: &ContentBlock) -> InputContentBlock {
        match block {
            ContentBlock::Text { text } if role == MessageRole::System => InputContentBlock::Text {
                text: format!("[SYSTEM]\n{text}"),
            },
            ContentBlock::Text { text } => InputContentBlock::Text { text: text.clone() },
            ContentBlock::ToolUse { id, name, input } => InputContentBlock::ToolUse {
                id: id.clone(),
                name: name.clone(),
                input: input.clone(),
            },
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => InputContentBlock::ToolResult {
                tool_use_id: tool_use_id.clone(),
                content: content.clone(),
                is_error: is_error.then_some(true),
            },
        }
    }

    /// Split the transcript into the API's `system` field and an alternating
    /// message list. The head system message becomes `system`; later system
    /// and tool-result messages travel as user content, and consecutive
    /// messages with the same API role are merged.
    fn build_request(
        &self,
        messages: &[ProviderMessage],
        tools: &[ToolSpec],
        model: &str,
        temperature: f64,
    ) -> ChatRequest {
        let (system, rest) = match messages.split_first() {
            Some((head, rest)) if head.role == MessageRole::System => (head.text_content(), rest),
            _ => (None, messages),
        };

        let mut converted: Vec<Message> = Vec::with_capacity(rest.len());
        for message in rest {
            let role = Self::api_role(message.role);
            let blocks = message
                .content
                .iter()
                .map(|block| Self::convert_block(message.role, block));
            match converted.last_mut() {
                Some(last) if last.role == role => last.content.extend(blocks),
                _ => converted.push(Message {
                    role,
                    content: blocks.collect(),
                }),
            }
        }

        let tools = if tools.is_empty() {
            None
        } else {
            Some(
                tools
                    .iter()
                    .map(|tool| AnthropicToolDef {
                        name: tool.name.clone(),
                        description: tool.description.clone(),
                        input_schema: tool.parameters.clone(),
                    })
                    .collect(),
            )
        };

        ChatRequest {
            model: model.to_string(),
            max_tokens: self.max_tokens,
            system,
            messages: converted,
            tools,
            temperature,
        }
    }

    fn map_stop_reason(stop_reason: Option<&str>) -> Option<StopReason> {
        stop_reason.map(|reason| match reason {
            "end_turn" | "stop_sequence" => StopReason::EndTurn,
            "tool_use" => StopReason::ToolUse,
            "max_tokens" => StopReason::MaxTokens,
            _ => StopReason::Error,
        })
    }

    fn parse_content_blocks(blocks: Vec<ResponseContentBlock>) -> Vec<ContentBlock> {
        blocks
            .into_iter()
            .filter_map(|block| match block {
                ResponseContentBlock::Text { text } => Some(ContentBlock::Text { text }),
                ResponseContentBlock::ToolUse { id, name, input } => {
                    Some(ContentBlock::ToolUse { id, name, input })
                }
                ResponseContentBlock::Unsupported => None,
            })
            .collect()
    }

    async fn call_api(&self, request: &ChatRequest) -> anyhow::Result<ChatResponse> {
        let api_key = self.api_key.as_deref().ok_or_else(|| LlmError::Auth {
            provider: "anthropic".into(),
        })?;

        let response = self
            .client
            .post(&self.messages_url)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .header("x-api-key", api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| LlmError::Request {
                provider: "anthropic".into(),
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(api_error("anthropic", response).await.into());
        }

        response.json().await.map_err(|e| {
            LlmError::Decode {
                provider: "anthropic".into(),
                message: e.to_string(),
            }
            .into()
        })
    }
}

impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn chat_with_tools<'a>(
        &'a self,
        messages: &'a [ProviderMessage],
        tools: &'a [ToolSpec],
        model: &'a str,
        temperature: f64,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ProviderResponse>> + Send + 'a>> {
        Box::pin(async move {
            let request = self.build_request(messages, tools, model, temperature);
            let chat_response = self.call_api(&request).await?;

            let stop_reason = Self::map_stop_reason(chat_response.stop_reason.as_deref());
            let content_blocks = Self::parse_content_blocks(chat_response.content);
            let text = content_blocks
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    ContentBlock::ToolUse { .. } | ContentBlock::ToolResult { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n");

            let mut provider_response = match chat_response.usage {
                Some(usage) => {
                    ProviderResponse::with_usage(text, usage.input_tokens, usage.output_tokens)
                }
                None => ProviderResponse::text_only(text),
            };
            provider_response.content_blocks = content_blocks;
            provider_response.stop_reason = stop_reason;
            if let Some(api_model) = chat_response.model {
                provider_response = provider_response.with_model(api_model);
            }
            Ok(provider_response)
        })
    }
}
