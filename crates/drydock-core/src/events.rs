use serde::{Deserialize, Serialize};

use crate::ids::ToolCallId;

/// Progress events pushed to the caller during a run.
///
/// Every run terminates with exactly one `Done`, regardless of outcome.
/// A `ToolUse` is always followed by exactly one matching `ToolResult`
/// before the next `ToolUse` begins.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum RunEvent {
    #[serde(rename = "status")]
    Status { message: String },

    #[serde(rename = "text")]
    Text { content: String },

    #[serde(rename = "tool_use")]
    ToolUse {
        id: ToolCallId,
        tool: String,
        input: serde_json::Value,
    },

    #[serde(rename = "tool_result")]
    ToolResult {
        id: ToolCallId,
        payload: String,
        is_error: bool,
    },

    #[serde(rename = "file")]
    File { path: String, size: u64 },

    #[serde(rename = "error")]
    Error { message: String },

    #[serde(rename = "done")]
    Done { message: String },
}

impl RunEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Status { .. } => "status",
            Self::Text { .. } => "text",
            Self::ToolUse { .. } => "tool_use",
            Self::ToolResult { .. } => "tool_result",
            Self::File { .. } => "file",
            Self::Error { .. } => "error",
            Self::Done { .. } => "done",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_str() {
        let evt = RunEvent::Status {
            message: "working".into(),
        };
        assert_eq!(evt.event_type(), "status");
        assert!(!evt.is_terminal());

        let done = RunEvent::Done {
            message: "finished".into(),
        };
        assert_eq!(done.event_type(), "done");
        assert!(done.is_terminal());
    }

    #[test]
    fn tagged_wire_shape() {
        let evt = RunEvent::ToolUse {
            id: ToolCallId::from_raw("toolu_1"),
            tool: "bash".into(),
            input: serde_json::json!({"command": "ls"}),
        };
        let json = serde_json::to_value(&evt).unwrap();
        assert_eq!(json["type"], "tool_use");
        assert_eq!(json["data"]["tool"], "bash");
        assert_eq!(json["data"]["input"]["command"], "ls");
    }

    #[test]
    fn serde_roundtrip() {
        let events = vec![
            RunEvent::Status { message: "s".into() },
            RunEvent::Text { content: "t".into() },
            RunEvent::ToolUse {
                id: ToolCallId::new(),
                tool: "grep".into(),
                input: serde_json::json!({"pattern": "x"}),
            },
            RunEvent::ToolResult {
                id: ToolCallId::new(),
                payload: "{}".into(),
                is_error: true,
            },
            RunEvent::File { path: "notes.txt".into(), size: 12 },
            RunEvent::Error { message: "bad".into() },
            RunEvent::Done { message: "done".into() },
        ];
        for evt in &events {
            let json = serde_json::to_string(evt).unwrap();
            let parsed: RunEvent = serde_json::from_str(&json).unwrap();
            assert_eq!(evt.event_type(), parsed.event_type());
        }
    }
}
