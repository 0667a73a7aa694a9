use anyhow::Result;
use rusqlite::params;

use super::{Store, now_rfc3339};
use super::types::{JobPatch, JobStatus, NewJob, ScheduledJobRecord};

impl Store {
    pub async fn create_job(&self, new: NewJob) -> Result<ScheduledJobRecord> {
        let record = ScheduledJobRecord {
            id: uuid::Uuid::new_v4().to_string(),
            name: new.name,
            prompt: new.prompt,
            cron: new.cron,
            enabled: new.enabled,
            one_off: new.one_off,
            last_run: None,
            last_status: None,
            last_output: None,
            created_at: now_rfc3339(),
        };

        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO scheduled_jobs (id, name, prompt, cron, enabled, one_off, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.id,
                record.name,
                record.prompt,
                record.cron,
                record.enabled,
                record.one_off,
                record.created_at
            ],
        )?;
        Ok(record)
    }

    pub async fn get_job(&self, id: &str) -> Result<Option<ScheduledJobRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&format!("{JOB_SELECT} WHERE id = ?1"))?;
        let mut rows = stmt.query_map(params![id], job_from_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    pub async fn list_jobs(&self) -> Result<Vec<ScheduledJobRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&format!("{JOB_SELECT} ORDER BY created_at"))?;
        let rows = stmt.query_map([], job_from_row)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// Applies a partial update and returns the resulting record, or `None`
    /// when no such job exists.
    pub async fn update_job(&self, id: &str, patch: JobPatch) -> Result<Option<ScheduledJobRecord>> {
        let Some(current) = self.get_job(id).await? else {
            return Ok(None);
        };
        let merged = ScheduledJobRecord {
            name: patch.name.unwrap_or(current.name),
            prompt: patch.prompt.unwrap_or(current.prompt),
            cron: patch.cron.unwrap_or(current.cron),
            enabled: patch.enabled.unwrap_or(current.enabled),
            one_off: patch.one_off.unwrap_or(current.one_off),
            ..current
        };

        let db = self.db.lock().await;
        db.execute(
            "UPDATE scheduled_jobs SET name = ?1, prompt = ?2, cron = ?3, enabled = ?4, one_off = ?5
             WHERE id = ?6",
            params![
                merged.name,
                merged.prompt,
                merged.cron,
                merged.enabled,
                merged.one_off,
                merged.id
            ],
        )?;
        Ok(Some(merged))
    }

    pub async fn delete_job(&self, id: &str) -> Result<bool> {
        let db = self.db.lock().await;
        let rows = db.execute("DELETE FROM scheduled_jobs WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    pub async fn record_job_run(&self, id: &str, status: JobStatus, output: &str) -> Result<bool> {
        let db = self.db.lock().await;
        let rows = db.execute(
            "UPDATE scheduled_jobs SET last_run = ?1, last_status = ?2, last_output = ?3
             WHERE id = ?4",
            params![now_rfc3339(), status.as_str(), output, id],
        )?;
        Ok(rows > 0)
    }

    pub async fn set_job_enabled(&self, id: &str, enabled: bool) -> Result<bool> {
        let db = self.db.lock().await;
        let rows = db.execute(
            "UPDATE scheduled_jobs SET enabled = ?1 WHERE id = ?2",
            params![enabled, id],
        )?;
        Ok(rows > 0)
    }
}

const JOB_SELECT: &str = "SELECT id, name, prompt, cron, enabled, one_off, last_run, last_status, \
                          last_output, created_at FROM scheduled_jobs";

fn job_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ScheduledJobRecord> {
    Ok(ScheduledJobRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        prompt: row.get(2)?,
        cron: row.get(3)?,
        enabled: row.get(4)?,
        one_off: row.get(5)?,
        last_run: row.get(6)?,
        last_status: row.get(7)?,
        last_output: row.get(8)?,
        created_at: row.get(9)?,
    })
}
