use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::ProviderError;
use crate::messages::{AssistantContent, Message, StopReason};

/// Tool definition sent to the model alongside the conversation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters_schema: serde_json::Value,
}

/// One completion request: the full history plus the fixed tool schema.
pub struct CompletionRequest<'a> {
    pub messages: &'a [Message],
    pub tools: &'a [ToolDefinition],
    pub system: Option<&'a str>,
    pub model: &'a str,
}

/// One completion response: an ordered list of segments plus a stop
/// indicator. Segment order is the processing order.
#[derive(Clone, Debug)]
pub struct Completion {
    pub content: Vec<AssistantContent>,
    pub stop_reason: StopReason,
}

impl Completion {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![AssistantContent::Text { text: text.into() }],
            stop_reason: StopReason::EndTurn,
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        self.content
            .iter()
            .any(|c| matches!(c, AssistantContent::ToolCall(_)))
    }
}

/// The completion capability. Wire formats of individual model providers
/// live behind this seam.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(
        &self,
        request: CompletionRequest<'_>,
    ) -> Result<Completion, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ToolCallId;
    use crate::messages::ToolCallBlock;

    #[test]
    fn text_completion_has_no_tool_calls() {
        let c = Completion::text("hello");
        assert!(!c.has_tool_calls());
        assert_eq!(c.stop_reason, StopReason::EndTurn);
    }

    #[test]
    fn tool_completion_detected() {
        let c = Completion {
            content: vec![AssistantContent::ToolCall(ToolCallBlock {
                id: ToolCallId::new(),
                name: "bash".into(),
                arguments: serde_json::json!({"command": "ls"}),
            })],
            stop_reason: StopReason::ToolUse,
        };
        assert!(c.has_tool_calls());
    }

    #[test]
    fn tool_definition_serde() {
        let def = ToolDefinition {
            name: "read".into(),
            description: "Read a file".into(),
            parameters_schema: serde_json::json!({
                "type": "object",
                "required": ["path"],
                "properties": {"path": {"type": "string"}}
            }),
        };
        let json = serde_json::to_value(&def).unwrap();
        assert_eq!(json["name"], "read");
        assert_eq!(json["parameters_schema"]["required"][0], "path");
    }
}
