use axum::{extract::State, response::IntoResponse, Json};
use playback_protocol::EdgeNodeDescriptor;

use crate::http::response::bad_request;
use crate::registry::upsert;
use crate::state::AppState;

pub async fn register(
    State(state): State<AppState>,
    body: Result<Json<EdgeNodeDescriptor>, axum::extract::rejection::JsonRejection>,
) -> impl IntoResponse {
    let Json(descriptor) = match body {
        Ok(body) => body,
        Err(e) => return bad_request(e.to_string()),
    };
    upsert(
        &state.registry,
        descriptor.id,
        descriptor.url,
        descriptor.capacity,
        descriptor.connections,
    )
    .await;
    axum::http::StatusCode::OK.into_response()
}

pub async fn heartbeat(
    State(state): State<AppState>,
    body: Result<Json<EdgeNodeDescriptor>, axum::extract::rejection::JsonRejection>,
) -> impl IntoResponse {
    // Register and heartbeat both upsert the registry entry; register is
    // distinguished only by logging at the call site in the source system.
    register(State(state), body).await
}
