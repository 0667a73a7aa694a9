use std::collections::VecDeque;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::info;

use crate::core::engine::{AgentEngine, EngineMessage, EngineRunOptions};
use crate::core::feed::{FeedItem, FeedReducer, ToolCallRecord};
use crate::core::stream::{StreamEvent, ToolCategory};

/// Tool output carried on events and feed items is capped at this many
/// characters; full output lives only in the engine's own transcript.
pub const TOOL_OUTPUT_LIMIT: usize = 2000;

/// Everything one engine run produced, ready for persistence.
#[derive(Debug)]
pub struct RunOutput {
    /// Token captured from the run's `system-init`, if any. Not written
    /// back to the session when the run failed.
    pub continuation: Option<String>,
    /// Concatenation of all assistant text, in arrival order.
    pub content: String,
    pub tool_calls: Vec<ToolCallRecord>,
    pub items: Vec<FeedItem>,
    pub failure: Option<String>,
}

/// Drives one engine run: translates each engine message into a stream
/// event, forwards it as one JSON frame to the sink, and folds it into a
/// private reducer for persistence. A closed sink (client went away)
/// suppresses further writes but never interrupts the run; failures from
/// the engine end the run with a trailing `error` feed item instead of
/// propagating.
pub async fn drive_engine_run(
    engine: &dyn AgentEngine,
    prompt: &str,
    opts: EngineRunOptions,
    mut sink: Option<&mpsc::Sender<String>>,
) -> RunOutput {
    let mut reducer = FeedReducer::new();
    let mut continuation: Option<String> = None;
    let mut content = String::new();
    // Engine results carry no tool name; they pair FIFO against dispatched
    // tool uses.
    let mut dispatched: VecDeque<String> = VecDeque::new();
    let mut failure: Option<String> = None;

    match engine.start_run(prompt, opts).await {
        Ok(mut stream) => {
            while let Some(message) = stream.recv().await {
                match message {
                    Ok(EngineMessage::SystemInit { token }) => {
                        if continuation.is_none() {
                            continuation = Some(token);
                        }
                    }
                    Ok(EngineMessage::AssistantText { text }) => {
                        content.push_str(&text);
                        let event = StreamEvent::Text { content: text };
                        reducer.apply(&event);
                        forward(&mut sink, &event).await;
                    }
                    Ok(EngineMessage::AssistantToolUse { name, input }) => {
                        let event = StreamEvent::ToolCall {
                            summary: summarize(&name, &input),
                            category: categorize(&name),
                            tool: name.clone(),
                            input,
                        };
                        dispatched.push_back(name);
                        reducer.apply(&event);
                        forward(&mut sink, &event).await;
                    }
                    Ok(EngineMessage::UserToolResult {
                        content: output,
                        is_error,
                    }) => {
                        let event = StreamEvent::ToolResult {
                            tool: dispatched.pop_front().unwrap_or_default(),
                            output: truncate_chars(&output, TOOL_OUTPUT_LIMIT),
                            is_error,
                        };
                        reducer.apply(&event);
                        forward(&mut sink, &event).await;
                    }
                    Ok(EngineMessage::RunResult { cost, duration_ms }) => {
                        let event = StreamEvent::Result { cost, duration_ms };
                        reducer.apply(&event);
                        forward(&mut sink, &event).await;
                    }
                    Err(e) => {
                        failure = Some(e.to_string());
                        break;
                    }
                }
            }
        }
        Err(e) => failure = Some(e.to_string()),
    }

    if let Some(message) = &failure {
        reducer.apply(&StreamEvent::Error {
            message: message.clone(),
        });
    }

    let (items, tool_calls) = reducer.into_parts();
    RunOutput {
        continuation,
        content,
        tool_calls,
        items,
        failure,
    }
}

async fn forward(sink: &mut Option<&mpsc::Sender<String>>, event: &StreamEvent) {
    if let Some(tx) = sink
        && let Ok(frame) = serde_json::to_string(event)
        && tx.send(frame).await.is_err()
    {
        info!("Feed client disconnected; run continues for persistence");
        *sink = None;
    }
}

pub fn categorize(tool: &str) -> ToolCategory {
    match tool {
        "Bash" => ToolCategory::Command,
        "Read" | "Write" | "Edit" | "Glob" => ToolCategory::File,
        "Grep" => ToolCategory::Search,
        _ => ToolCategory::Other,
    }
}

pub fn summarize(tool: &str, input: &Value) -> String {
    let field = |key: &str| input.get(key).and_then(Value::as_str).unwrap_or("");
    match tool {
        "Bash" => format!("Run: {}", truncate_chars(field("command"), 50)),
        "Read" => format!("Read: {}", field("file_path")),
        "Write" => format!("Write: {}", field("file_path")),
        "Edit" => format!("Edit: {}", field("file_path")),
        "Glob" => format!("Find: {}", field("pattern")),
        "Grep" => format!("Search: {}", field("pattern")),
        _ => tool.to_string(),
    }
}

/// Character-based truncation; record boundaries are bytes but user-facing
/// limits are characters.
pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::engine::testing::ScriptedEngine;
    use crate::core::feed::FeedItemKind;
    use serde_json::json;

    fn full_script() -> Vec<EngineMessage> {
        vec![
            EngineMessage::SystemInit {
                token: "tok-1".to_string(),
            },
            EngineMessage::AssistantText {
                text: "Hi".to_string(),
            },
            EngineMessage::AssistantText {
                text: " there".to_string(),
            },
            EngineMessage::AssistantToolUse {
                name: "Read".to_string(),
                input: json!({"file_path": "a.txt"}),
            },
            EngineMessage::UserToolResult {
                content: "contents".to_string(),
                is_error: false,
            },
            EngineMessage::RunResult {
                cost: Some(0.002),
                duration_ms: 1500,
            },
        ]
    }

    #[tokio::test]
    async fn run_produces_merged_feed_and_paired_calls() {
        let engine = ScriptedEngine::new(full_script());
        let out = drive_engine_run(&engine, "hello", EngineRunOptions::default(), None).await;

        assert_eq!(out.failure, None);
        assert_eq!(out.continuation.as_deref(), Some("tok-1"));
        assert_eq!(out.content, "Hi there");
        assert_eq!(out.items.len(), 4);
        assert_eq!(
            out.items[0].kind,
            FeedItemKind::Text {
                content: "Hi there".to_string()
            }
        );
        assert_eq!(
            out.tool_calls,
            vec![ToolCallRecord {
                name: "Read".to_string(),
                input: json!({"file_path": "a.txt"}),
                output: Some("contents".to_string()),
            }]
        );
    }

    #[tokio::test]
    async fn every_event_is_forwarded_as_one_frame() {
        let engine = ScriptedEngine::new(full_script());
        let (tx, mut rx) = mpsc::channel::<String>(32);
        drive_engine_run(&engine, "hello", EngineRunOptions::default(), Some(&tx)).await;
        drop(tx);

        let mut frames = Vec::new();
        while let Some(frame) = rx.recv().await {
            frames.push(frame);
        }
        // system-init is captured, not forwarded; text arrives unmerged.
        assert_eq!(frames.len(), 5);
        assert!(frames[0].contains(r#""type":"text""#));
        assert!(frames[0].contains(r#""content":"Hi""#));
        assert!(frames[1].contains(r#""content":" there""#));
        assert!(frames[2].contains(r#""type":"tool_call""#));
        assert!(frames[2].contains(r#""summary":"Read: a.txt""#));
        assert!(frames[2].contains(r#""category":"file""#));
        assert!(frames[3].contains(r#""type":"tool_result""#));
        assert!(frames[4].contains(r#""durationMs":1500"#));
    }

    #[tokio::test]
    async fn engine_failure_appends_error_item_and_keeps_partial_output() {
        let engine = ScriptedEngine::failing_after(
            vec![
                EngineMessage::SystemInit {
                    token: "tok-2".to_string(),
                },
                EngineMessage::AssistantText {
                    text: "partial".to_string(),
                },
            ],
            "engine crashed",
        );
        let out = drive_engine_run(&engine, "hello", EngineRunOptions::default(), None).await;

        assert_eq!(out.failure.as_deref(), Some("engine crashed"));
        assert_eq!(out.content, "partial");
        assert_eq!(out.items.len(), 2);
        assert_eq!(
            out.items[1].kind,
            FeedItemKind::Error {
                content: "engine crashed".to_string()
            }
        );
        // Captured token is returned; the caller decides not to persist it.
        assert_eq!(out.continuation.as_deref(), Some("tok-2"));
    }

    #[tokio::test]
    async fn disconnected_sink_suppresses_writes_but_not_the_run() {
        let engine = ScriptedEngine::new(full_script());
        let (tx, rx) = mpsc::channel::<String>(32);
        drop(rx);

        let out = drive_engine_run(&engine, "hello", EngineRunOptions::default(), Some(&tx)).await;
        assert_eq!(out.failure, None);
        assert_eq!(out.content, "Hi there");
        assert_eq!(out.items.len(), 4);
    }

    #[tokio::test]
    async fn tool_results_pair_fifo_against_dispatched_uses() {
        let engine = ScriptedEngine::new(vec![
            EngineMessage::AssistantToolUse {
                name: "Bash".to_string(),
                input: json!({"command": "first"}),
            },
            EngineMessage::AssistantToolUse {
                name: "Bash".to_string(),
                input: json!({"command": "second"}),
            },
            EngineMessage::UserToolResult {
                content: "out-1".to_string(),
                is_error: false,
            },
            EngineMessage::UserToolResult {
                content: "out-2".to_string(),
                is_error: true,
            },
        ]);
        let out = drive_engine_run(&engine, "run both", EngineRunOptions::default(), None).await;

        assert_eq!(out.tool_calls.len(), 2);
        assert_eq!(out.tool_calls[0].output.as_deref(), Some("out-1"));
        assert_eq!(out.tool_calls[1].output.as_deref(), Some("out-2"));
        assert!(matches!(
            out.items[3].kind,
            FeedItemKind::ToolResult { is_error: true, .. }
        ));
    }

    #[tokio::test]
    async fn orphan_engine_result_is_surfaced_with_empty_tool_name() {
        let engine = ScriptedEngine::new(vec![EngineMessage::UserToolResult {
            content: "orphan".to_string(),
            is_error: false,
        }]);
        let out = drive_engine_run(&engine, "hello", EngineRunOptions::default(), None).await;

        assert_eq!(out.items.len(), 1);
        assert!(
            matches!(&out.items[0].kind, FeedItemKind::ToolResult { tool, .. } if tool.is_empty())
        );
        assert!(out.tool_calls.is_empty());
    }

    #[tokio::test]
    async fn tool_output_is_truncated_on_events_and_pairs() {
        let long_output = "x".repeat(TOOL_OUTPUT_LIMIT + 500);
        let engine = ScriptedEngine::new(vec![
            EngineMessage::AssistantToolUse {
                name: "Bash".to_string(),
                input: json!({"command": "yes"}),
            },
            EngineMessage::UserToolResult {
                content: long_output,
                is_error: false,
            },
        ]);
        let out = drive_engine_run(&engine, "spam", EngineRunOptions::default(), None).await;

        match &out.items[1].kind {
            FeedItemKind::ToolResult { output, .. } => {
                assert_eq!(output.chars().count(), TOOL_OUTPUT_LIMIT)
            }
            other => panic!("unexpected item: {other:?}"),
        }
        assert_eq!(
            out.tool_calls[0].output.as_ref().unwrap().chars().count(),
            TOOL_OUTPUT_LIMIT
        );
    }

    #[test]
    fn categorize_matches_the_tool_table() {
        assert_eq!(categorize("Bash"), ToolCategory::Command);
        assert_eq!(categorize("Read"), ToolCategory::File);
        assert_eq!(categorize("Write"), ToolCategory::File);
        assert_eq!(categorize("Edit"), ToolCategory::File);
        assert_eq!(categorize("Glob"), ToolCategory::File);
        assert_eq!(categorize("Grep"), ToolCategory::Search);
        assert_eq!(categorize("WebFetch"), ToolCategory::Other);
    }

    #[test]
    fn summarize_renders_per_tool_lines() {
        assert_eq!(
            summarize("Bash", &json!({"command": "cargo build --release"})),
            "Run: cargo build --release"
        );
        let long_command = "a".repeat(80);
        let summary = summarize("Bash", &json!({ "command": long_command }));
        assert_eq!(summary, format!("Run: {}", "a".repeat(50)));

        assert_eq!(
            summarize("Read", &json!({"file_path": "/notes/today.md"})),
            "Read: /notes/today.md"
        );
        assert_eq!(summarize("Glob", &json!({"pattern": "**/*.md"})), "Find: **/*.md");
        assert_eq!(summarize("Grep", &json!({"pattern": "TODO"})), "Search: TODO");
        assert_eq!(summarize("WebFetch", &json!({"url": "http://x"})), "WebFetch");
        assert_eq!(summarize("Read", &json!({})), "Read: ");
    }
}
