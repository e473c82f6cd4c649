use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use drydock_core::errors::ProviderError;
use drydock_core::ids::ToolCallId;
use drydock_core::messages::{AssistantContent, Message, StopReason, ToolCallBlock};
use drydock_core::provider::{Completion, CompletionProvider, CompletionRequest};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Configuration for the Anthropic messages client.
pub struct AnthropicConfig {
    pub api_key: SecretString,
    pub base_url: String,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl AnthropicConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::from(api_key.into()),
            base_url: DEFAULT_BASE_URL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Read the API key from `ANTHROPIC_API_KEY`.
    pub fn from_env() -> Result<Self, ProviderError> {
        let key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| {
            ProviderError::AuthenticationFailed("ANTHROPIC_API_KEY is not set".into())
        })?;
        if key.trim().is_empty() {
            return Err(ProviderError::AuthenticationFailed(
                "ANTHROPIC_API_KEY is empty".into(),
            ));
        }
        Ok(Self::new(key))
    }
}

/// Non-streaming Anthropic messages client.
pub struct AnthropicProvider {
    config: AnthropicConfig,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(config: AnthropicConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_default();
        Self { config, client }
    }
}

#[async_trait]
impl CompletionProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    #[instrument(skip_all, fields(model = request.model))]
    async fn complete(
        &self,
        request: CompletionRequest<'_>,
    ) -> Result<Completion, ProviderError> {
        let body = ApiRequest {
            model: request.model,
            max_tokens: self.config.max_tokens,
            system: request.system,
            messages: request.messages.iter().map(ApiMessage::from).collect(),
            tools: request.tools.iter().map(ApiTool::from).collect(),
        };

        let url = format!("{}/v1/messages", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .header("x-api-key", self.config.api_key.expose_secret())
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(self.config.timeout)
                } else {
                    ProviderError::NetworkError(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if status != 200 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs);
            let text = response.text().await.unwrap_or_default();
            let mut err = ProviderError::from_status(status, text);
            if let ProviderError::RateLimited { retry_after: slot } = &mut err {
                *slot = retry_after;
            }
            return Err(err);
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::NetworkError(format!("malformed response: {e}")))?;

        debug!(
            blocks = api_response.content.len(),
            stop_reason = api_response.stop_reason.as_deref().unwrap_or("none"),
            "completion received"
        );
        Ok(parse_completion(api_response))
    }
}

fn parse_completion(response: ApiResponse) -> Completion {
    let content = response
        .content
        .into_iter()
        .map(|block| match block {
            ApiContentBlock::Text { text } => AssistantContent::Text { text },
            ApiContentBlock::ToolUse { id, name, input } => {
                AssistantContent::ToolCall(ToolCallBlock {
                    id: ToolCallId::from_raw(id),
                    name,
                    arguments: input,
                })
            }
        })
        .collect();

    let stop_reason = match response.stop_reason.as_deref() {
        Some("tool_use") => StopReason::ToolUse,
        Some("max_tokens") => StopReason::MaxTokens,
        _ => StopReason::EndTurn,
    };

    Completion {
        content,
        stop_reason,
    }
}

// --- Wire types ---

#[derive(Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool>,
}

#[derive(Serialize)]
struct ApiMessage {
    role: &'static str,
    content: Vec<ApiRequestBlock>,
}

#[derive(Serialize)]
#[serde(tag = "type")]
enum ApiRequestBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
        is_error: bool,
    },
}

#[derive(Serialize)]
struct ApiTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

impl From<&drydock_core::provider::ToolDefinition> for ApiTool {
    fn from(def: &drydock_core::provider::ToolDefinition) -> Self {
        Self {
            name: def.name.clone(),
            description: def.description.clone(),
            input_schema: def.parameters_schema.clone(),
        }
    }
}

impl From<&Message> for ApiMessage {
    fn from(msg: &Message) -> Self {
        match msg {
            Message::User(u) => ApiMessage {
                role: "user",
                content: vec![ApiRequestBlock::Text {
                    text: u.content.clone(),
                }],
            },
            Message::Assistant(a) => ApiMessage {
                role: "assistant",
                content: a
                    .content
                    .iter()
                    .map(|c| match c {
                        AssistantContent::Text { text } => {
                            ApiRequestBlock::Text { text: text.clone() }
                        }
                        AssistantContent::ToolCall(tc) => ApiRequestBlock::ToolUse {
                            id: tc.id.as_str().to_string(),
                            name: tc.name.clone(),
                            input: tc.arguments.clone(),
                        },
                    })
                    .collect(),
            },
            // Tool results ride on the user role in the messages API.
            Message::ToolResult(tr) => ApiMessage {
                role: "user",
                content: vec![ApiRequestBlock::ToolResult {
                    tool_use_id: tr.tool_call_id.as_str().to_string(),
                    content: tr.content.clone(),
                    is_error: tr.is_error,
                }],
            },
        }
    }
}

#[derive(Deserialize)]
struct ApiResponse {
    content: Vec<ApiContentBlock>,
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum ApiContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
}
