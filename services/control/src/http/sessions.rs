use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use playback_protocol::{
    error_codes, CreateSessionResponse, PlaybackState, ValidateSessionResponse,
};
use rand::RngCore;
use serde::Deserialize;
use session_store::SESSION_TTL;
use tracing::{error, info};
use uuid::Uuid;

use crate::http::response::{json_error, not_found, service_unavailable};
use crate::registry::{select_least_loaded, snapshot};
use crate::state::AppState;

fn generate_host_token() -> String {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub async fn create_session(State(state): State<AppState>) -> impl IntoResponse {
    let nodes = snapshot(&state.registry).await;
    let Some(edge) = select_least_loaded(&nodes) else {
        return service_unavailable(
            error_codes::NO_STREAMING_SERVERS_AVAILABLE,
            "no active edge nodes to assign this session to",
        );
    };
    let streaming_url = edge.url.clone();

    let session_id = Uuid::new_v4().to_string();
    let host_token = generate_host_token();
    let initial_state = PlaybackState::initial(now_ms());

    if let Err(e) = state
        .store
        .create_session(&session_id, &streaming_url, &host_token, initial_state, SESSION_TTL)
        .await
    {
        error!(session_id = %session_id, error = %e, "session creation failed");
        return internal_error_with_code(error_codes::SESSION_CREATION_FAILED, e);
    }

    info!(session_id = %session_id, streaming_url = %streaming_url, "session created");
    (
        axum::http::StatusCode::CREATED,
        Json(CreateSessionResponse {
            session_key: session_id,
            streaming_url,
            host_token,
        }),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
pub struct ValidateQuery {
    #[serde(rename = "hostToken")]
    pub host_token: Option<String>,
}

pub async fn validate_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<ValidateQuery>,
) -> impl IntoResponse {
    let exists = match state.store.session_exists(&session_id).await {
        Ok(exists) => exists,
        Err(e) => return internal_error_with_code(error_codes::VALIDATION_ERROR, e),
    };
    if !exists {
        return Json(ValidateSessionResponse::invalid()).into_response();
    }

    let streaming_url = match state.store.get_streaming_url(&session_id).await {
        Ok(url) => url,
        Err(e) => return internal_error_with_code(error_codes::VALIDATION_ERROR, e),
    };

    let is_host = match &query.host_token {
        Some(presented) => match state.store.get_host_token(&session_id).await {
            Ok(Some(stored)) => stored == *presented,
            Ok(None) => false,
            Err(e) => return internal_error_with_code(error_codes::VALIDATION_ERROR, e),
        },
        None => false,
    };

    Json(ValidateSessionResponse {
        valid: true,
        is_host,
        streaming_url,
    })
    .into_response()
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    match state.store.get_playback_state(&session_id).await {
        Ok(Some(playback_state)) => Json(playback_state).into_response(),
        Ok(None) => not_found("session not found"),
        Err(e) => internal_error_with_code(error_codes::VALIDATION_ERROR, e),
    }
}

fn internal_error_with_code(code: &str, err: impl std::fmt::Display) -> axum::response::Response {
    json_error(axum::http::StatusCode::INTERNAL_SERVER_ERROR, code, err.to_string())
}

fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
