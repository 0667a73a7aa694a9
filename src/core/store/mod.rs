mod jobs;
pub mod types;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, params};
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;

use crate::core::feed::{FeedItem, ToolCallRecord};
use types::{SessionRecord, TurnRecord, TurnRole};

/// SQLite-backed persistence for sessions, turns and scheduled jobs.
/// Cloning shares the same connection.
#[derive(Clone)]
pub struct Store {
    db: Arc<Mutex<Connection>>,
}

pub(crate) fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

impl Store {
    pub async fn new<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        if !data_dir.exists() {
            fs::create_dir_all(&data_dir).await?;
        }

        let db_path = data_dir.join("feedline.db");
        let db = Connection::open(&db_path)
            .with_context(|| format!("failed to open database at {}", db_path.display()))?;
        db.pragma_update(None, "foreign_keys", true)?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                system_prompt TEXT,
                continuation_token TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS turns (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                tool_calls TEXT NOT NULL,
                feed_items TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        db.execute(
            "CREATE INDEX IF NOT EXISTS idx_turns_session_id ON turns(session_id)",
            [],
        )?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS scheduled_jobs (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                prompt TEXT NOT NULL,
                cron TEXT NOT NULL,
                enabled INTEGER NOT NULL DEFAULT 1,
                one_off INTEGER NOT NULL DEFAULT 0,
                last_run TEXT,
                last_status TEXT,
                last_output TEXT,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    pub async fn create_session(
        &self,
        title: Option<&str>,
        system_prompt: Option<&str>,
    ) -> Result<SessionRecord> {
        let record = SessionRecord {
            id: uuid::Uuid::new_v4().to_string(),
            title: match title {
                Some(t) if !t.is_empty() => t.to_string(),
                _ => "New Chat".to_string(),
            },
            system_prompt: system_prompt.filter(|p| !p.is_empty()).map(String::from),
            continuation_token: None,
            created_at: now_rfc3339(),
            updated_at: now_rfc3339(),
        };

        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO sessions (id, title, system_prompt, continuation_token, created_at, updated_at)
             VALUES (?1, ?2, ?3, NULL, ?4, ?5)",
            params![
                record.id,
                record.title,
                record.system_prompt,
                record.created_at,
                record.updated_at
            ],
        )?;
        Ok(record)
    }

    pub async fn get_session(&self, id: &str) -> Result<Option<SessionRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT id, title, system_prompt, continuation_token, created_at, updated_at
             FROM sessions WHERE id = ?1",
        )?;

        let mut rows = stmt.query_map(params![id], |row| {
            Ok(SessionRecord {
                id: row.get(0)?,
                title: row.get(1)?,
                system_prompt: row.get(2)?,
                continuation_token: row.get(3)?,
                created_at: row.get(4)?,
                updated_at: row.get(5)?,
            })
        })?;

        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    pub async fn list_sessions(&self) -> Result<Vec<SessionRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT id, title, system_prompt, continuation_token, created_at, updated_at
             FROM sessions ORDER BY updated_at DESC",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(SessionRecord {
                id: row.get(0)?,
                title: row.get(1)?,
                system_prompt: row.get(2)?,
                continuation_token: row.get(3)?,
                created_at: row.get(4)?,
                updated_at: row.get(5)?,
            })
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// Replaces the editable fields and bumps `updated_at`. Callers merge
    /// a partial update onto the current record first.
    pub async fn update_session(
        &self,
        id: &str,
        title: &str,
        system_prompt: Option<&str>,
    ) -> Result<bool> {
        let db = self.db.lock().await;
        let rows = db.execute(
            "UPDATE sessions SET title = ?1, system_prompt = ?2, updated_at = ?3 WHERE id = ?4",
            params![title, system_prompt, now_rfc3339(), id],
        )?;
        Ok(rows > 0)
    }

    /// Deletes a session; its turns go with it.
    pub async fn delete_session(&self, id: &str) -> Result<bool> {
        let db = self.db.lock().await;
        let rows = db.execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    /// Marks a session touched after a turn. The continuation token and
    /// title only change when given; a failed run passes neither.
    pub async fn finish_turn(
        &self,
        id: &str,
        continuation: Option<&str>,
        title: Option<&str>,
    ) -> Result<bool> {
        let db = self.db.lock().await;
        let rows = db.execute(
            "UPDATE sessions SET
                updated_at = ?1,
                continuation_token = COALESCE(?2, continuation_token),
                title = COALESCE(?3, title)
             WHERE id = ?4",
            params![now_rfc3339(), continuation, title, id],
        )?;
        Ok(rows > 0)
    }

    pub async fn append_turn(
        &self,
        session_id: &str,
        role: TurnRole,
        content: &str,
        tool_calls: &[ToolCallRecord],
        feed_items: &[FeedItem],
    ) -> Result<TurnRecord> {
        let record = TurnRecord {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            role: role.as_str().to_string(),
            content: content.to_string(),
            tool_calls: tool_calls.to_vec(),
            feed_items: feed_items.to_vec(),
            created_at: now_rfc3339(),
        };

        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO turns (id, session_id, role, content, tool_calls, feed_items, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.id,
                record.session_id,
                record.role,
                record.content,
                serde_json::to_string(&record.tool_calls)?,
                serde_json::to_string(&record.feed_items)?,
                record.created_at
            ],
        )?;
        Ok(record)
    }

    /// Turns in insertion order, which is also feed order.
    pub async fn list_turns(&self, session_id: &str) -> Result<Vec<TurnRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT id, session_id, role, content, tool_calls, feed_items, created_at
             FROM turns WHERE session_id = ?1 ORDER BY rowid",
        )?;

        let rows = stmt.query_map(params![session_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?;

        let mut results = Vec::new();
        for row in rows {
            let (id, session_id, role, content, tool_calls, feed_items, created_at) = row?;
            results.push(TurnRecord {
                id,
                session_id,
                role,
                content,
                tool_calls: serde_json::from_str(&tool_calls)
                    .context("corrupt tool_calls column")?,
                feed_items: serde_json::from_str(&feed_items)
                    .context("corrupt feed_items column")?,
                created_at,
            });
        }
        Ok(results)
    }

    /// The session's whole feed: every turn's items concatenated in turn
    /// order. Replaying this equals the feed as it streamed live.
    pub async fn session_feed(&self, session_id: &str) -> Result<Vec<FeedItem>> {
        let turns = self.list_turns(session_id).await?;
        Ok(turns.into_iter().flat_map(|t| t.feed_items).collect())
    }
}

/// A throwaway store under a unique temp directory. Avoids cross-test
/// interference.
#[cfg(test)]
pub(crate) async fn test_store() -> Store {
    let tmpdir = std::env::temp_dir().join(format!("feedline-test-{}", uuid::Uuid::new_v4()));
    Store::new(&tmpdir).await.expect("open test store")
}
