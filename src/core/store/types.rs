use serde::Serialize;

use crate::core::feed::{FeedItem, ToolCallRecord};

/// A chat session row, serialized camelCase for the HTTP surface.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    pub title: String,
    pub system_prompt: Option<String>,
    pub continuation_token: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// One persisted turn: the user's prompt or the full product of one
/// engine run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnRecord {
    pub id: String,
    pub session_id: String,
    pub role: String,
    pub content: String,
    pub tool_calls: Vec<ToolCallRecord>,
    pub feed_items: Vec<FeedItem>,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnRole {
    User,
    Assistant,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledJobRecord {
    pub id: String,
    pub name: String,
    pub prompt: String,
    pub cron: String,
    pub enabled: bool,
    pub one_off: bool,
    pub last_run: Option<String>,
    pub last_status: Option<String>,
    pub last_output: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Success,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Success => "success",
            JobStatus::Error => "error",
        }
    }
}

/// Fields accepted when creating a job. `enabled` defaults to true and
/// `one_off` to false when the request omits them.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub name: String,
    pub prompt: String,
    pub cron: String,
    pub enabled: bool,
    pub one_off: bool,
}

/// Patch-style job update: only the present fields change.
#[derive(Debug, Clone, Default)]
pub struct JobPatch {
    pub name: Option<String>,
    pub prompt: Option<String>,
    pub cron: Option<String>,
    pub enabled: Option<bool>,
    pub one_off: Option<bool>,
}
