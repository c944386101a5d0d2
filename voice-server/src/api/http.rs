//! Router construction and the liveness/readiness handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use super::ws::ws_handler;
use super::AppState;

const SERVICE_ID: &str = "voice-server";

/// Creates the Axum router with every route registered.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

/// Liveness probe: "is the process running?". Always 200 while serving.
async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": SERVICE_ID }))
}

/// Readiness probe: "can the service handle sessions?". 503 until the
/// orchestrator's shared resources have finished initializing.
async fn readiness_check(State(state): State<AppState>) -> Response {
    let ready = state.lifecycle.is_ready();
    let retrieval_ready = state.shared.retrieval.is_ready();
    let body = json!({
        "status": if ready { "ready" } else { "not_ready" },
        "ready": ready,
        "checks": {
            "lifecycle": { "ready": ready },
            "retrieval": { "ready": retrieval_ready, "info": "optional - degrades to empty facts packs" },
        },
        "activeSessions": state.sessions.len(),
    });

    if ready {
        Json(body).into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
    }
}
