use axum::{
    Json,
    extract::{Path, State},
};
use tracing::warn;

use super::super::AppState;
use crate::core::scheduler::validate_cron;
use crate::core::store::types::{JobPatch, NewJob};

pub async fn list_jobs_endpoint(State(state): State<AppState>) -> Json<serde_json::Value> {
    let jobs = match state.store.list_jobs().await {
        Ok(jobs) => jobs,
        Err(e) => return Json(serde_json::json!({ "success": false, "error": e.to_string() })),
    };

    let mut jobs_list = Vec::new();
    for job in jobs {
        let armed = state.scheduler.is_armed(&job.id).await;
        let mut value = serde_json::to_value(&job).unwrap_or_default();
        value["armed"] = serde_json::Value::Bool(armed);
        jobs_list.push(value);
    }
    Json(serde_json::json!({ "success": true, "jobs": jobs_list }))
}

#[derive(serde::Deserialize)]
pub struct CreateJobRequest {
    #[serde(default)]
    name: String,
    #[serde(default)]
    prompt: String,
    #[serde(default)]
    cron: String,
    #[serde(default = "enabled_default")]
    enabled: bool,
    #[serde(default, rename = "oneOff")]
    one_off: bool,
}

fn enabled_default() -> bool {
    true
}

pub async fn create_job_endpoint(
    State(state): State<AppState>,
    Json(payload): Json<CreateJobRequest>,
) -> Json<serde_json::Value> {
    let name = payload.name.trim().to_string();
    let prompt = payload.prompt.trim().to_string();
    let cron = payload.cron.trim().to_string();
    if name.is_empty() || prompt.is_empty() || cron.is_empty() {
        return Json(serde_json::json!({
            "success": false,
            "error": "name, prompt, and cron are required"
        }));
    }
    // Validate before persisting anything.
    if let Err(e) = validate_cron(&cron) {
        return Json(serde_json::json!({
            "success": false,
            "error": format!("Invalid cron expression: {}", e)
        }));
    }

    let job = match state
        .store
        .create_job(NewJob {
            name,
            prompt,
            cron,
            enabled: payload.enabled,
            one_off: payload.one_off,
        })
        .await
    {
        Ok(job) => job,
        Err(e) => return Json(serde_json::json!({ "success": false, "error": e.to_string() })),
    };

    if let Err(e) = state.scheduler.register(&job).await {
        warn!("Job '{}' persisted but not armed: {}", job.name, e);
        return Json(serde_json::json!({
            "success": true,
            "job": job,
            "warning": format!("job saved but timer registration failed: {}", e)
        }));
    }
    Json(serde_json::json!({ "success": true, "job": job }))
}

#[derive(serde::Deserialize)]
pub struct UpdateJobRequest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    cron: Option<String>,
    #[serde(default)]
    enabled: Option<bool>,
    #[serde(default, rename = "oneOff")]
    one_off: Option<bool>,
}

/// Patch a job and reconcile its timer: registering again replaces any
/// existing timer, and a disabled result leaves it disarmed.
pub async fn update_job_endpoint(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<UpdateJobRequest>,
) -> Json<serde_json::Value> {
    if let Some(cron) = payload.cron.as_deref()
        && let Err(e) = validate_cron(cron.trim())
    {
        return Json(serde_json::json!({
            "success": false,
            "error": format!("Invalid cron expression: {}", e)
        }));
    }

    let patch = JobPatch {
        name: payload.name,
        prompt: payload.prompt,
        cron: payload.cron.map(|c| c.trim().to_string()),
        enabled: payload.enabled,
        one_off: payload.one_off,
    };
    let job = match state.store.update_job(&id, patch).await {
        Ok(Some(job)) => job,
        Ok(None) => return Json(serde_json::json!({ "success": false, "error": "Job not found" })),
        Err(e) => return Json(serde_json::json!({ "success": false, "error": e.to_string() })),
    };

    if let Err(e) = state.scheduler.register(&job).await {
        warn!("Job '{}' updated but not re-armed: {}", job.name, e);
        return Json(serde_json::json!({
            "success": true,
            "job": job,
            "warning": format!("job saved but timer registration failed: {}", e)
        }));
    }
    Json(serde_json::json!({ "success": true, "job": job }))
}

pub async fn delete_job_endpoint(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Json<serde_json::Value> {
    state.scheduler.unregister(&id).await;
    match state.store.delete_job(&id).await {
        Ok(true) => Json(serde_json::json!({ "success": true, "message": "Job deleted" })),
        Ok(false) => Json(serde_json::json!({ "success": false, "error": "Job not found" })),
        Err(e) => Json(serde_json::json!({ "success": false, "error": e.to_string() })),
    }
}
