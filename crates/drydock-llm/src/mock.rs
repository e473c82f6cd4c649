use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use drydock_core::errors::ProviderError;
use drydock_core::ids::ToolCallId;
use drydock_core::messages::{AssistantContent, StopReason, ToolCallBlock};
use drydock_core::provider::{Completion, CompletionProvider, CompletionRequest};

/// Pre-programmed responses for deterministic testing without API calls.
pub enum MockResponse {
    /// Return this completion.
    Completion(Completion),
    /// Return an error from the `complete` call itself.
    Error(ProviderError),
    /// Wait a duration, then yield the inner response.
    Delay(Duration, Box<MockResponse>),
}

impl MockResponse {
    /// Convenience: a plain text completion.
    pub fn text(text: &str) -> Self {
        Self::Completion(Completion::text(text))
    }

    /// Convenience: a completion requesting a single tool call.
    pub fn tool_call(name: &str, arguments: serde_json::Value) -> Self {
        Self::Completion(Completion {
            content: vec![AssistantContent::ToolCall(ToolCallBlock {
                id: ToolCallId::new(),
                name: name.to_string(),
                arguments,
            })],
            stop_reason: StopReason::ToolUse,
        })
    }

    /// Convenience: interleaved text then a tool call, in that order.
    pub fn text_then_tool_call(text: &str, name: &str, arguments: serde_json::Value) -> Self {
        Self::Completion(Completion {
            content: vec![
                AssistantContent::Text { text: text.to_string() },
                AssistantContent::ToolCall(ToolCallBlock {
                    id: ToolCallId::new(),
                    name: name.to_string(),
                    arguments,
                }),
            ],
            stop_reason: StopReason::ToolUse,
        })
    }

    /// Convenience: wrap any response with a delay.
    pub fn delayed(delay: Duration, inner: MockResponse) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

/// Mock provider that returns pre-programmed responses in sequence.
pub struct MockProvider {
    responses: Mutex<VecDeque<MockResponse>>,
    call_count: AtomicUsize,
}

impl MockProvider {
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            call_count: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl CompletionProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(
        &self,
        _request: CompletionRequest<'_>,
    ) -> Result<Completion, ProviderError> {
        let idx = self.call_count.fetch_add(1, Ordering::Relaxed);
        let Some(response) = self.responses.lock().pop_front() else {
            return Err(ProviderError::InvalidRequest(format!(
                "MockProvider: no response configured for call {idx}"
            )));
        };

        let mut current = response;
        loop {
            match current {
                MockResponse::Completion(c) => return Ok(c),
                MockResponse::Error(e) => return Err(e),
                MockResponse::Delay(duration, inner) => {
                    tokio::time::sleep(duration).await;
                    current = *inner;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drydock_core::messages::Message;

    fn request<'a>(messages: &'a [Message]) -> CompletionRequest<'a> {
        CompletionRequest {
            messages,
            tools: &[],
            system: None,
            model: "mock-model",
        }
    }

    #[tokio::test]
    async fn text_response() {
        let mock = MockProvider::new(vec![MockResponse::text("hello world")]);
        let messages = vec![Message::user_text("hi")];
        let completion = mock.complete(request(&messages)).await.unwrap();

        assert_eq!(completion.stop_reason, StopReason::EndTurn);
        assert!(matches!(
            &completion.content[0],
            AssistantContent::Text { text } if text == "hello world"
        ));
    }

    #[tokio::test]
    async fn tool_call_response() {
        let mock = MockProvider::new(vec![MockResponse::tool_call(
            "bash",
            serde_json::json!({"command": "ls"}),
        )]);
        let messages = vec![Message::user_text("list files")];
        let completion = mock.complete(request(&messages)).await.unwrap();

        assert_eq!(completion.stop_reason, StopReason::ToolUse);
        assert!(completion.has_tool_calls());
    }

    #[tokio::test]
    async fn error_response() {
        let mock = MockProvider::new(vec![MockResponse::Error(
            ProviderError::AuthenticationFailed("bad".into()),
        )]);
        let messages = vec![Message::user_text("hi")];
        let result = mock.complete(request(&messages)).await;
        assert!(matches!(result, Err(ProviderError::AuthenticationFailed(_))));
    }

    #[tokio::test]
    async fn sequential_responses() {
        let mock = MockProvider::new(vec![
            MockResponse::text("first"),
            MockResponse::text("second"),
        ]);
        let messages = vec![Message::user_text("hi")];

        let first = mock.complete(request(&messages)).await.unwrap();
        assert_eq!(mock.call_count(), 1);
        assert!(matches!(&first.content[0], AssistantContent::Text { text } if text == "first"));

        let second = mock.complete(request(&messages)).await.unwrap();
        assert_eq!(mock.call_count(), 2);
        assert!(matches!(&second.content[0], AssistantContent::Text { text } if text == "second"));
    }

    #[tokio::test]
    async fn exhausted_responses() {
        let mock = MockProvider::new(vec![MockResponse::text("only one")]);
        let messages = vec![Message::user_text("hi")];

        let _ = mock.complete(request(&messages)).await;
        let result = mock.complete(request(&messages)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn delayed_response() {
        let mock = MockProvider::new(vec![MockResponse::delayed(
            Duration::from_millis(50),
            MockResponse::text("after delay"),
        )]);
        let messages = vec![Message::user_text("hi")];

        let start = std::time::Instant::now();
        let completion = mock.complete(request(&messages)).await.unwrap();
        assert!(
            start.elapsed() >= Duration::from_millis(40),
            "delay should have waited ~50ms"
        );
        assert!(!completion.has_tool_calls());
    }
}
