use axum::{
    Json,
    extract::{Path, State},
};

use super::super::AppState;

pub async fn list_sessions_endpoint(State(state): State<AppState>) -> Json<serde_json::Value> {
    match state.store.list_sessions().await {
        Ok(sessions) => Json(serde_json::json!({ "success": true, "sessions": sessions })),
        Err(e) => Json(serde_json::json!({ "success": false, "error": e.to_string() })),
    }
}

#[derive(serde::Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default)]
    title: Option<String>,
    #[serde(default, rename = "systemPrompt")]
    system_prompt: Option<String>,
}

pub async fn create_session_endpoint(
    State(state): State<AppState>,
    Json(payload): Json<CreateSessionRequest>,
) -> Json<serde_json::Value> {
    match state
        .store
        .create_session(payload.title.as_deref(), payload.system_prompt.as_deref())
        .await
    {
        Ok(session) => Json(serde_json::json!({ "success": true, "session": session })),
        Err(e) => Json(serde_json::json!({ "success": false, "error": e.to_string() })),
    }
}

/// One session with its full turn history; replaying the turns' feed items
/// in order reproduces the live feed.
pub async fn get_session_endpoint(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Json<serde_json::Value> {
    let session = match state.store.get_session(&id).await {
        Ok(Some(session)) => session,
        Ok(None) => {
            return Json(serde_json::json!({ "success": false, "error": "Session not found" }));
        }
        Err(e) => return Json(serde_json::json!({ "success": false, "error": e.to_string() })),
    };
    match state.store.list_turns(&id).await {
        Ok(turns) => {
            Json(serde_json::json!({ "success": true, "session": session, "turns": turns }))
        }
        Err(e) => Json(serde_json::json!({ "success": false, "error": e.to_string() })),
    }
}

#[derive(serde::Deserialize)]
pub struct UpdateSessionRequest {
    #[serde(default)]
    title: Option<String>,
    #[serde(default, rename = "systemPrompt")]
    system_prompt: Option<String>,
}

pub async fn update_session_endpoint(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<UpdateSessionRequest>,
) -> Json<serde_json::Value> {
    let current = match state.store.get_session(&id).await {
        Ok(Some(session)) => session,
        Ok(None) => {
            return Json(serde_json::json!({ "success": false, "error": "Session not found" }));
        }
        Err(e) => return Json(serde_json::json!({ "success": false, "error": e.to_string() })),
    };

    let title = payload.title.unwrap_or(current.title);
    let system_prompt = payload.system_prompt.or(current.system_prompt);
    match state
        .store
        .update_session(&id, &title, system_prompt.as_deref())
        .await
    {
        Ok(true) => Json(serde_json::json!({ "success": true, "message": "Session updated" })),
        Ok(false) => Json(serde_json::json!({ "success": false, "error": "Session not found" })),
        Err(e) => Json(serde_json::json!({ "success": false, "error": e.to_string() })),
    }
}

pub async fn delete_session_endpoint(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Json<serde_json::Value> {
    match state.store.delete_session(&id).await {
        Ok(true) => Json(serde_json::json!({ "success": true, "message": "Session deleted" })),
        Ok(false) => Json(serde_json::json!({ "success": false, "error": "Session not found" })),
        Err(e) => Json(serde_json::json!({ "success": false, "error": e.to_string() })),
    }
}
