use axum::{extract::State, response::IntoResponse, Json};
use playback_protocol::HealthResponse;
use tracing::warn;

use crate::registry::snapshot;
use crate::state::AppState;

pub async fn healthz() -> impl IntoResponse {
    "ok"
}

pub async fn readyz() -> impl IntoResponse {
    "ok"
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let servers = snapshot(&state.registry).await.len();
    // Sessions live in the shared store, not the in-memory registry; a
    // store error here shouldn't fail the health check, just report 0.
    let sessions = match state.store.session_count().await {
        Ok(count) => count,
        Err(e) => {
            warn!(error = %e, "failed to count live sessions for /health");
            0
        }
    };
    Json(HealthResponse {
        status: "ok".to_owned(),
        servers,
        sessions,
    })
}
