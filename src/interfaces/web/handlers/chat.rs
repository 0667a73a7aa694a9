use axum::{
    Json,
    extract::State,
    response::IntoResponse,
    response::sse::{Event, Sse},
};
use std::convert::Infallible;
use tokio_stream::StreamExt;
use tracing::error;

use super::super::AppState;
use crate::core::engine::EngineRunOptions;
use crate::core::feed::FeedItem;
use crate::core::relay::{drive_engine_run, truncate_chars};
use crate::core::store::types::TurnRole;
use crate::core::stream::StreamEvent;

const AUTO_TITLE_LIMIT: usize = 80;

#[derive(serde::Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    prompt: String,
    #[serde(default, rename = "sessionId")]
    session_id: String,
}

/// One user turn: persists the prompt, drives one engine run, and streams
/// each event as one SSE frame. The run and its persistence outlive a
/// disconnected client.
pub async fn chat_endpoint(
    State(state): State<AppState>,
    Json(payload): Json<ChatRequest>,
) -> axum::response::Response {
    let prompt = payload.prompt.trim().to_string();
    if prompt.is_empty() {
        return Json(serde_json::json!({ "success": false, "error": "prompt is required" }))
            .into_response();
    }

    let session = match state.store.get_session(payload.session_id.trim()).await {
        Ok(Some(session)) => session,
        Ok(None) => {
            return Json(serde_json::json!({ "success": false, "error": "Session not found" }))
                .into_response();
        }
        Err(e) => {
            return Json(serde_json::json!({ "success": false, "error": e.to_string() }))
                .into_response();
        }
    };

    // The user turn is durable before any engine event exists.
    if let Err(e) = state
        .store
        .append_turn(
            &session.id,
            TurnRole::User,
            &prompt,
            &[],
            &[FeedItem::user(&prompt)],
        )
        .await
    {
        return Json(serde_json::json!({ "success": false, "error": e.to_string() }))
            .into_response();
    }

    let (tx, rx) = tokio::sync::mpsc::channel::<String>(32);
    tokio::spawn(async move {
        let opts = EngineRunOptions {
            continuation: session.continuation_token.clone(),
            system_prompt: session.system_prompt.clone(),
        };
        let out = drive_engine_run(state.engine.as_ref(), &prompt, opts, Some(&tx)).await;

        if let Err(e) = state
            .store
            .append_turn(
                &session.id,
                TurnRole::Assistant,
                &out.content,
                &out.tool_calls,
                &out.items,
            )
            .await
        {
            error!("Failed to persist assistant turn for {}: {}", session.id, e);
        }

        // A failed run touches the session but writes no token or title.
        let (token, title) = match out.failure {
            Some(_) => (None, None),
            None => {
                let retitle = (session.title.is_empty() || session.title == "New Chat")
                    .then(|| truncate_chars(&prompt, AUTO_TITLE_LIMIT));
                (out.continuation.as_deref(), retitle)
            }
        };
        if let Err(e) = state
            .store
            .finish_turn(&session.id, token, title.as_deref())
            .await
        {
            error!("Failed to finish turn for {}: {}", session.id, e);
        }

        let terminal = match &out.failure {
            Some(message) => StreamEvent::Error {
                message: message.clone(),
            },
            None => StreamEvent::Done,
        };
        if let Ok(frame) = serde_json::to_string(&terminal) {
            let _ = tx.send(frame).await;
        }
    });

    let stream = tokio_stream::wrappers::ReceiverStream::new(rx)
        .map(|frame| Ok::<_, Infallible>(Event::default().data(frame)));

    Sse::new(stream).into_response()
}
