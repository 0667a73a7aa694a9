use anyhow::{Context, Result, anyhow};
use console::style;
use reqwest::Client;
use serde_json::Value;
use std::io::Write;
use tokio_stream::StreamExt;
use tokio_util::io::StreamReader;

use crate::core::stream::{EventStream, StreamEvent, ToolCategory};
use crate::core::terminal::print_error;

/// Sends one prompt to a running daemon and renders the live feed until the
/// run's terminal frame. Without `--session` a fresh session is created and
/// its id printed so the conversation can be resumed.
pub async fn run_chat(api_url: &str, prompt: &str, session: Option<&str>) -> Result<()> {
    let client = Client::new();

    let session_id = match session {
        Some(id) => {
            replay_session(&client, api_url, id).await?;
            id.to_string()
        }
        None => {
            let created: Value = client
                .post(format!("{}/api/sessions", api_url))
                .json(&serde_json::json!({}))
                .send()
                .await
                .context("Is the daemon running? Start it with: feedline serve")?
                .json()
                .await?;
            let id = created["session"]["id"]
                .as_str()
                .ok_or_else(|| anyhow!("daemon returned no session id"))?
                .to_string();
            println!("{} {}", style("session:").dim(), style(&id).dim());
            id
        }
    };

    println!("{} {}", style(">").cyan().bold(), prompt);

    let response = client
        .post(format!("{}/api/chat", api_url))
        .json(&serde_json::json!({ "prompt": prompt, "sessionId": session_id }))
        .send()
        .await
        .context("Is the daemon running? Start it with: feedline serve")?;

    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    if !content_type.starts_with("text/event-stream") {
        // Validation failures come back as a plain JSON envelope.
        let body: Value = response.json().await?;
        let message = body["error"].as_str().unwrap_or("request rejected");
        return Err(anyhow!("{}", message));
    }

    let bytes = response
        .bytes_stream()
        .map(|r| r.map_err(std::io::Error::other));
    let mut events = EventStream::new(StreamReader::new(bytes));

    let mut mid_text = false;
    while let Some(event) = events.next_event().await? {
        match event {
            StreamEvent::Text { content } => {
                print!("{}", content);
                std::io::stdout().flush().ok();
                mid_text = true;
            }
            StreamEvent::ToolCall {
                summary, category, ..
            } => {
                end_text_line(&mut mid_text);
                println!(
                    "  {} {}",
                    style(category_glyph(category)).yellow(),
                    style(summary).dim()
                );
            }
            StreamEvent::ToolResult {
                output, is_error, ..
            } => {
                end_text_line(&mut mid_text);
                let first_line = output.lines().next().unwrap_or("");
                if is_error {
                    println!("  {} {}", style("✗").red(), style(first_line).red().dim());
                } else {
                    println!("  {} {}", style("✓").green(), style(first_line).dim());
                }
            }
            StreamEvent::Result { cost, duration_ms } => {
                end_text_line(&mut mid_text);
                let mut line = format!("{:.1}s", duration_ms as f64 / 1000.0);
                if let Some(cost) = cost {
                    line.push_str(&format!(", ${:.4}", cost));
                }
                println!("  {}", style(line).dim());
            }
            StreamEvent::Error { message } => {
                end_text_line(&mut mid_text);
                print_error(&message);
                break;
            }
            StreamEvent::Done => {
                end_text_line(&mut mid_text);
                break;
            }
        }
    }
    Ok(())
}

/// Prints the stored feed of an existing session before the new prompt, so
/// resuming reads as one continuous feed.
async fn replay_session(client: &Client, api_url: &str, id: &str) -> Result<()> {
    let body: Value = client
        .get(format!("{}/api/sessions/{}", api_url, id))
        .send()
        .await
        .context("Is the daemon running? Start it with: feedline serve")?
        .json()
        .await?;
    if body["success"] != true {
        let message = body["error"].as_str().unwrap_or("session lookup failed");
        return Err(anyhow!("{}", message));
    }

    if let Some(title) = body["session"]["title"].as_str() {
        println!("{}", style(title).bold());
    }
    let turns = body["turns"].as_array().cloned().unwrap_or_default();
    for turn in &turns {
        let items = turn["feedItems"].as_array().cloned().unwrap_or_default();
        for item in &items {
            render_feed_item(item);
        }
    }
    if !turns.is_empty() {
        println!();
    }
    Ok(())
}

fn render_feed_item(item: &Value) {
    let text = |key: &str| item[key].as_str().unwrap_or("");
    match item["type"].as_str().unwrap_or("") {
        "user" => println!("{} {}", style(">").cyan().bold(), text("content")),
        "text" => println!("{}", text("content")),
        "tool_call" => println!("  {} {}", style("⚙").yellow(), style(text("summary")).dim()),
        "tool_result" => {
            let first_line = text("output").lines().next().unwrap_or("");
            let glyph = if item["isError"].as_bool().unwrap_or(false) {
                style("✗").red()
            } else {
                style("✓").green()
            };
            println!("  {} {}", glyph, style(first_line).dim());
        }
        "result" => {
            let secs = item["durationMs"].as_u64().unwrap_or(0) as f64 / 1000.0;
            println!("  {}", style(format!("{:.1}s", secs)).dim());
        }
        "error" => println!("  {}", style(text("content")).red()),
        _ => {}
    }
}

fn category_glyph(category: ToolCategory) -> &'static str {
    match category {
        ToolCategory::Command => "$",
        ToolCategory::File => "✎",
        ToolCategory::Search => "⌕",
        ToolCategory::Other => "⚙",
    }
}

fn end_text_line(mid_text: &mut bool) {
    if *mid_text {
        println!();
        *mid_text = false;
    }
}

/// Lists stored sessions, newest first.
pub async fn run_sessions(api_url: &str) -> Result<()> {
    let client = Client::new();
    let body: Value = client
        .get(format!("{}/api/sessions", api_url))
        .send()
        .await
        .context("Is the daemon running? Start it with: feedline serve")?
        .json()
        .await?;
    if body["success"] != true {
        let message = body["error"].as_str().unwrap_or("session list failed");
        return Err(anyhow!("{}", message));
    }

    let sessions = body["sessions"].as_array().cloned().unwrap_or_default();
    if sessions.is_empty() {
        println!("{}", style("No sessions yet.").dim());
        return Ok(());
    }
    for session in &sessions {
        println!(
            "{}  {}  {}",
            style(session["id"].as_str().unwrap_or("?")).dim(),
            style(session["title"].as_str().unwrap_or("Untitled")).bold(),
            style(session["updatedAt"].as_str().unwrap_or("")).dim()
        );
    }
    Ok(())
}
