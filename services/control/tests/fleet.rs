use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use control::registry::{select_least_loaded, upsert, EdgeNode, EdgeStatus, T_EVICT};
use control::state::AppState;
use http_body_util::BodyExt;
use playback_protocol::EdgeNodeDescriptor;
use session_store::MemoryStore;
use tower::ServiceExt;

#[tokio::test]
async fn register_endpoint_adds_a_visible_fleet_entry() {
    let state = AppState::new(Arc::new(MemoryStore::new()));
    let router = control::build_router(state.clone());

    let descriptor = EdgeNodeDescriptor {
        id: "edge-1".to_owned(),
        url: "http://edge-1:8081".to_owned(),
        capacity: 100,
        connections: 0,
    };
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/streaming-servers/register")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&descriptor).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let health = router
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = health.into_body().collect().await.unwrap().to_bytes();
    let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(parsed["servers"], 1);
}

#[tokio::test]
async fn health_sessions_count_reflects_created_sessions() {
    let state = AppState::new(Arc::new(MemoryStore::new()));
    let router = control::build_router(state.clone());
    upsert(&state.registry, "edge-1".to_owned(), "http://edge-1:8081".to_owned(), 100, 0).await;

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(parsed["sessions"], 0);

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
        .unwrap();

    let response = router
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(parsed["sessions"], 1);
}

#[tokio::test]
async fn malformed_register_body_is_rejected_with_400() {
    let state = AppState::new(Arc::new(MemoryStore::new()));
    let router = control::build_router(state);

    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/streaming-servers/register")
                .header("content-type", "application/json")
                .body(Body::from("{not-json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

/// Scenario 6 (spec.md §8): an evicted edge node is absent from the
/// selection function's candidate set, so session creation either picks a
/// different node or fails over to 503.
#[test]
fn evicted_edge_is_absent_from_selection() {
    let fresh = EdgeNode {
        id: "edge-2".to_owned(),
        url: "http://edge-2".to_owned(),
        capacity: 10,
        observed_load: 0,
        status: EdgeStatus::Active,
        last_ping: Instant::now(),
    };
    let mut stale = fresh.clone();
    stale.id = "edge-1".to_owned();
    stale.last_ping = Instant::now() - T_EVICT - Duration::from_secs(1);

    // The sweep task would have already removed `stale`; here we simulate
    // a registry snapshot taken after a sweep pass.
    let nodes: Vec<EdgeNode> = vec![stale, fresh]
        .into_iter()
        .filter(|n| n.last_ping.elapsed() <= T_EVICT)
        .collect();
    assert_eq!(nodes.len(), 1);
    assert_eq!(select_least_loaded(&nodes).unwrap().id, "edge-2");
}
