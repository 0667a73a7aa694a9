use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::stream::{StreamEvent, ToolCategory};

/// One durable unit of the activity feed. `kind` flattens into the wire
/// object next to the creation timestamp:
/// `{"type":"text","content":"...","timestamp":"..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
    #[serde(flatten)]
    pub kind: FeedItemKind,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedItemKind {
    User {
        content: String,
    },
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
        content: String,
    },
}

impl FeedItem {
    pub fn new(kind: FeedItemKind) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(FeedItemKind::User {
            content: content.into(),
        })
    }
}

/// A paired tool invocation as persisted in a turn's `toolCalls` column.
/// `output` is filled when a result matches the call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub name: String,
    pub input: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

/// Folds a stream of events into the ordered feed-item sequence. One
/// instance per consumer: the relay keeps a private one for persistence and
/// the client keeps its own for display, so both derive the same feed from
/// the same events.
///
/// Ephemeral state beyond the items themselves: a merge cursor that is live
/// only while the most recent item is a `text` item with nothing appended
/// since, and the FIFO set of tool calls awaiting a result.
#[derive(Debug, Default)]
pub struct FeedReducer {
    items: Vec<FeedItem>,
    merge_live: bool,
    pending: Vec<String>,
    pairs: Vec<ToolCallRecord>,
    done: bool,
}

impl FeedReducer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the turn's `user` item. Called once, before any engine
    /// events; the user item never participates in merging or pairing.
    pub fn seed_user(&mut self, prompt: &str) {
        self.merge_live = false;
        self.items.push(FeedItem::user(prompt));
    }

    pub fn apply(&mut self, event: &StreamEvent) {
        if self.done {
            return;
        }
        match event {
            StreamEvent::Text { content } => {
                if self.merge_live
                    && let Some(FeedItem {
                        kind: FeedItemKind::Text { content: merged },
                        ..
                    }) = self.items.last_mut()
                {
                    merged.push_str(content);
                    return;
                }
                self.items.push(FeedItem::new(FeedItemKind::Text {
                    content: content.clone(),
                }));
                self.merge_live = true;
            }
            StreamEvent::ToolCall {
                tool,
                input,
                summary,
                category,
            } => {
                self.merge_live = false;
                self.pending.push(tool.clone());
                self.pairs.push(ToolCallRecord {
                    name: tool.clone(),
                    input: input.clone(),
                    output: None,
                });
                self.items.push(FeedItem::new(FeedItemKind::ToolCall {
                    tool: tool.clone(),
                    input: input.clone(),
                    summary: summary.clone(),
                    category: *category,
                }));
            }
            StreamEvent::ToolResult {
                tool,
                output,
                is_error,
            } => {
                self.merge_live = false;
                // Earliest still-pending call with this name wins. The item
                // is appended even with no match: the call may have been
                // lost to a dropped record, and the orphan stays visible.
                if let Some(pos) = self.pending.iter().position(|name| name == tool) {
                    self.pending.remove(pos);
                    if let Some(pair) = self
                        .pairs
                        .iter_mut()
                        .find(|pair| pair.name == *tool && pair.output.is_none())
                    {
                        pair.output = Some(output.clone());
                    }
                }
                self.items.push(FeedItem::new(FeedItemKind::ToolResult {
                    tool: tool.clone(),
                    output: output.clone(),
                    is_error: *is_error,
                }));
            }
            StreamEvent::Result { cost, duration_ms } => {
                self.merge_live = false;
                self.items.push(FeedItem::new(FeedItemKind::Result {
                    cost: *cost,
                    duration_ms: *duration_ms,
                }));
            }
            StreamEvent::Error { message } => {
                self.merge_live = false;
                self.items.push(FeedItem::new(FeedItemKind::Error {
                    content: message.clone(),
                }));
            }
            StreamEvent::Done => {
                self.done = true;
            }
        }
    }

    pub fn items(&self) -> &[FeedItem] {
        &self.items
    }

    pub fn into_items(self) -> Vec<FeedItem> {
        self.items
    }

    /// Tool names dispatched but not yet matched with a result, FIFO order.
    pub fn pending_tools(&self) -> &[String] {
        &self.pending
    }

    /// The turn's paired invocation records, in dispatch order.
    pub fn tool_calls(&self) -> &[ToolCallRecord] {
        &self.pairs
    }

    pub fn into_parts(self) -> (Vec<FeedItem>, Vec<ToolCallRecord>) {
        (self.items, self.pairs)
    }

    pub fn is_done(&self) -> bool {
        self.done
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::stream::decode_event;
    use serde_json::json;

    fn text(content: &str) -> StreamEvent {
        StreamEvent::Text {
            content: content.to_string(),
        }
    }

    fn tool_call(tool: &str, input: Value) -> StreamEvent {
        StreamEvent::ToolCall {
            tool: tool.to_string(),
            input,
            summary: tool.to_string(),
            category: ToolCategory::Other,
        }
    }

    fn tool_result(tool: &str, output: &str) -> StreamEvent {
        StreamEvent::ToolResult {
            tool: tool.to_string(),
            output: output.to_string(),
            is_error: false,
        }
    }

    #[test]
    fn consecutive_text_events_merge_into_one_item() {
        let mut reducer = FeedReducer::new();
        reducer.apply(&text("Hel"));
        reducer.apply(&text("lo"));
        reducer.apply(&text(" world"));

        assert_eq!(reducer.items().len(), 1);
        assert_eq!(
            reducer.items()[0].kind,
            FeedItemKind::Text {
                content: "Hello world".to_string()
            }
        );
    }

    #[test]
    fn merge_keeps_the_first_items_timestamp() {
        let mut reducer = FeedReducer::new();
        reducer.apply(&text("a"));
        let stamped = reducer.items()[0].timestamp;
        reducer.apply(&text("b"));
        assert_eq!(reducer.items()[0].timestamp, stamped);
    }

    #[test]
    fn non_text_event_clears_the_merge_cursor() {
        let mut reducer = FeedReducer::new();
        reducer.apply(&text("before"));
        reducer.apply(&tool_call("Read", json!({"file_path": "a.txt"})));
        reducer.apply(&text("after"));

        assert_eq!(reducer.items().len(), 3);
        assert_eq!(
            reducer.items()[2].kind,
            FeedItemKind::Text {
                content: "after".to_string()
            }
        );
    }

    #[test]
    fn user_item_is_never_merged_into() {
        let mut reducer = FeedReducer::new();
        reducer.seed_user("do the thing");
        reducer.apply(&text("on it"));

        assert_eq!(reducer.items().len(), 2);
        assert!(matches!(reducer.items()[0].kind, FeedItemKind::User { .. }));
        assert!(matches!(reducer.items()[1].kind, FeedItemKind::Text { .. }));
    }

    #[test]
    fn call_then_result_pairs_and_clears_pending() {
        let mut reducer = FeedReducer::new();
        reducer.apply(&tool_call("Read", json!({"file_path": "a.txt"})));
        assert_eq!(reducer.pending_tools(), ["Read"]);

        reducer.apply(&tool_result("Read", "contents"));
        assert!(reducer.pending_tools().is_empty());
        assert_eq!(reducer.items().len(), 2);
        assert_eq!(
            reducer.tool_calls(),
            [ToolCallRecord {
                name: "Read".to_string(),
                input: json!({"file_path": "a.txt"}),
                output: Some("contents".to_string()),
            }]
        );
    }

    #[test]
    fn same_named_calls_pair_fifo() {
        let mut reducer = FeedReducer::new();
        reducer.apply(&tool_call("Bash", json!({"command": "first"})));
        reducer.apply(&tool_call("Bash", json!({"command": "second"})));
        reducer.apply(&tool_result("Bash", "out-1"));

        assert_eq!(reducer.pending_tools(), ["Bash"]);
        assert_eq!(reducer.tool_calls()[0].output.as_deref(), Some("out-1"));
        assert_eq!(reducer.tool_calls()[1].output, None);

        reducer.apply(&tool_result("Bash", "out-2"));
        assert!(reducer.pending_tools().is_empty());
        assert_eq!(reducer.tool_calls()[1].output.as_deref(), Some("out-2"));
    }

    #[test]
    fn unmatched_result_is_still_surfaced() {
        let mut reducer = FeedReducer::new();
        reducer.apply(&tool_result("Ghost", "orphan output"));

        assert_eq!(reducer.items().len(), 1);
        assert_eq!(
            reducer.items()[0].kind,
            FeedItemKind::ToolResult {
                tool: "Ghost".to_string(),
                output: "orphan output".to_string(),
                is_error: false,
            }
        );
        assert!(reducer.pending_tools().is_empty());
        assert!(reducer.tool_calls().is_empty());
    }

    #[test]
    fn result_with_different_name_does_not_consume_pending() {
        let mut reducer = FeedReducer::new();
        reducer.apply(&tool_call("Read", json!({})));
        reducer.apply(&tool_result("Write", "mismatch"));

        assert_eq!(reducer.pending_tools(), ["Read"]);
        assert_eq!(reducer.items().len(), 2);
    }

    #[test]
    fn full_turn_scenario_produces_four_items() {
        let mut reducer = FeedReducer::new();
        reducer.apply(&text("Hi"));
        reducer.apply(&text(" there"));
        reducer.apply(&tool_call("Read", json!({"path": "a.txt"})));
        reducer.apply(&tool_result("Read", "contents"));
        reducer.apply(&StreamEvent::Result {
            cost: Some(0.002),
            duration_ms: 1500,
        });

        let items = reducer.items();
        assert_eq!(items.len(), 4);
        assert_eq!(
            items[0].kind,
            FeedItemKind::Text {
                content: "Hi there".to_string()
            }
        );
        assert!(
            matches!(&items[1].kind, FeedItemKind::ToolCall { tool, .. } if tool == "Read")
        );
        assert!(
            matches!(&items[2].kind, FeedItemKind::ToolResult { tool, .. } if tool == "Read")
        );
        assert_eq!(
            items[3].kind,
            FeedItemKind::Result {
                cost: Some(0.002),
                duration_ms: 1500,
            }
        );
    }

    #[test]
    fn malformed_record_between_texts_does_not_break_the_merge() {
        let records = [
            r#"{"type":"text","content":"Hi"}"#,
            "{not json",
            r#"{"type":"text","content":" there"}"#,
        ];
        let mut reducer = FeedReducer::new();
        for record in records {
            if let Some(event) = decode_event(record) {
                reducer.apply(&event);
            }
        }

        assert_eq!(reducer.items().len(), 1);
        assert_eq!(
            reducer.items()[0].kind,
            FeedItemKind::Text {
                content: "Hi there".to_string()
            }
        );
    }

    #[test]
    fn done_ends_the_reduction() {
        let mut reducer = FeedReducer::new();
        reducer.apply(&text("before"));
        reducer.apply(&StreamEvent::Done);
        reducer.apply(&text("after"));

        assert!(reducer.is_done());
        assert_eq!(reducer.items().len(), 1);
        assert_eq!(
            reducer.items()[0].kind,
            FeedItemKind::Text {
                content: "before".to_string()
            }
        );
    }

    #[test]
    fn error_event_becomes_error_item() {
        let mut reducer = FeedReducer::new();
        reducer.apply(&StreamEvent::Error {
            message: "engine exploded".to_string(),
        });
        assert_eq!(
            reducer.items()[0].kind,
            FeedItemKind::Error {
                content: "engine exploded".to_string()
            }
        );
    }

    #[test]
    fn feed_items_round_trip_through_json() {
        let mut reducer = FeedReducer::new();
        reducer.seed_user("hello");
        reducer.apply(&text("Hi"));
        reducer.apply(&tool_call("Bash", json!({"command": "ls"})));
        reducer.apply(&tool_result("Bash", "files"));
        reducer.apply(&StreamEvent::Result {
            cost: None,
            duration_ms: 7,
        });

        let json = serde_json::to_string(reducer.items()).unwrap();
        let replayed: Vec<FeedItem> = serde_json::from_str(&json).unwrap();
        assert_eq!(replayed, reducer.items());
    }

    #[test]
    fn wire_shape_has_flat_type_and_timestamp() {
        let item = FeedItem::user("hey");
        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(value["type"], "user");
        assert_eq!(value["content"], "hey");
        assert!(value["timestamp"].is_string());
    }
}
