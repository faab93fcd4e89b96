use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use control::registry::upsert;
use control::state::AppState;
use http_body_util::BodyExt;
use playback_protocol::{CreateSessionResponse, ValidateSessionResponse};
use session_store::MemoryStore;
use tower::ServiceExt;

fn app_with_one_edge() -> (AppState, axum::Router) {
    let state = AppState::new(Arc::new(MemoryStore::new()));
    let router = control::build_router(state.clone());
    (state, router)
}

async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn create_session_returns_503_with_no_edge_nodes() {
    let (_state, router) = app_with_one_edge();
    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/sessions")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn create_session_assigns_the_least_loaded_edge() {
    let (state, router) = app_with_one_edge();
    upsert(&state.registry, "edge-1".to_owned(), "http://edge-1:8081".to_owned(), 100, 80).await;
    upsert(&state.registry, "edge-2".to_owned(), "http://edge-2:8081".to_owned(), 100, 10).await;

    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/sessions")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body: CreateSessionResponse = body_json(response).await;
    assert_eq!(body.streaming_url, "http://edge-2:8081");
    assert!(!body.host_token.is_empty());
    assert!(!body.session_key.is_empty());
}

#[tokio::test]
async fn validate_session_reports_host_only_with_matching_token() {
    let (state, router) = app_with_one_edge();
    upsert(&state.registry, "edge-1".to_owned(), "http://edge-1:8081".to_owned(), 100, 0).await;

    let created: CreateSessionResponse = body_json(
        router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/sessions")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap(),
    )
    .await;

    let uri = format!(
        "/api/sessions/{}/validate?hostToken={}",
        created.session_key, created.host_token
    );
    let response = router
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body: ValidateSessionResponse = body_json(response).await;
    assert!(body.valid);
    assert!(body.is_host);
    assert_eq!(body.streaming_url.as_deref(), Some("http://edge-1:8081"));

    let uri = format!("/api/sessions/{}/validate?hostToken=wrong", created.session_key);
    let response = router
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body: ValidateSessionResponse = body_json(response).await;
    assert!(body.valid);
    assert!(!body.is_host);
}

#[tokio::test]
async fn validate_session_for_unknown_id_is_invalid_not_an_error() {
    let (_state, router) = app_with_one_edge();
    let response = router
        .oneshot(
            Request::builder()
                .uri("/api/sessions/does-not-exist/validate")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: ValidateSessionResponse = body_json(response).await;
    assert!(!body.valid);
    assert!(!body.is_host);
}

#[tokio::test]
async fn get_session_404s_when_missing_200s_with_state_once_created() {
    let (state, router) = app_with_one_edge();
    upsert(&state.registry, "edge-1".to_owned(), "http://edge-1:8081".to_owned(), 100, 0).await;

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/sessions/does-not-exist")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let created: CreateSessionResponse = body_json(
        router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/sessions")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap(),
    )
    .await;

    let response = router
        .oneshot(
            Request::builder()
                .uri(format!("/api/sessions/{}", created.session_key))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let state: playback_protocol::PlaybackState = body_json(response).await;
    assert!(state.paused);
    assert_eq!(state.playback_rate, 1.0);
}
