use axum::{
    Json, Router,
    body::Body,
    http::{HeaderValue, Method, Request, header},
    middleware,
    middleware::Next,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;

use super::AppState;
use super::handlers::{chat, jobs, sessions};

fn build_localhost_cors() -> CorsLayer {
    // The feed UI is served from a local dev server; the API itself binds
    // localhost by default.
    let origins: Vec<HeaderValue> = [
        "http://127.0.0.1:3000",
        "http://localhost:3000",
        "http://127.0.0.1:17917",
        "http://localhost:17917",
    ]
    .iter()
    .filter_map(|o| o.parse().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::DELETE,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers(tower_http::cors::Any)
}

pub(crate) fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_endpoint))
        .route("/api/chat", post(chat::chat_endpoint))
        .route(
            "/api/sessions",
            get(sessions::list_sessions_endpoint).post(sessions::create_session_endpoint),
        )
        .route(
            "/api/sessions/{id}",
            get(sessions::get_session_endpoint)
                .patch(sessions::update_session_endpoint)
                .delete(sessions::delete_session_endpoint),
        )
        .route(
            "/api/jobs",
            get(jobs::list_jobs_endpoint).post(jobs::create_job_endpoint),
        )
        .route(
            "/api/jobs/{id}",
            axum::routing::patch(jobs::update_job_endpoint).delete(jobs::delete_job_endpoint),
        )
        .route("/api/logs/stream", get(super::sse_logs_endpoint))
        .layer(middleware::from_fn(security_headers))
        .layer(build_localhost_cors())
        .with_state(state)
}

async fn health_endpoint() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "success": true }))
}

async fn security_headers(req: Request<Body>, next: Next) -> axum::response::Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static(
            "default-src 'self'; script-src 'self'; style-src 'self' 'unsafe-inline'",
        ),
    );
    response
}
