use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One decoded unit of an agent run's output stream, as carried over the
/// wire. `done` is a terminal marker; everything else maps to a feed item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Text {
        content: String,
    },
    ToolCall {
        tool: String,
        input: Value,
        summary: String,
        category: ToolCategory,
    },
    #[serde(rename_all = "camelCase")]
    ToolResult {
        tool: String,
        output: String,
        is_error: bool,
    },
    #[serde(rename_all = "camelCase")]
    Result {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cost: Option<f64>,
        #[serde(default)]
        duration_ms: u64,
    },
    Error {
        message: String,
    },
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    Command,
    File,
    Search,
    Other,
}

impl ToolCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolCategory::Command => "command",
            ToolCategory::File => "file",
            ToolCategory::Search => "search",
            ToolCategory::Other => "other",
        }
    }
}

/// Parses one record as a stream event. Malformed syntax and unknown
/// discriminants yield `None`: such records are transport framing noise and
/// must not abort the stream.
pub fn decode_event(record: &str) -> Option<StreamEvent> {
    serde_json::from_str(record).ok()
}
