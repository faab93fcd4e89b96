use axum::extract::State;
use axum::Json;
use playback_protocol::EdgeNodeDescriptor;

use crate::state::NodeState;

pub async fn status(State(state): State<NodeState>) -> Json<EdgeNodeDescriptor> {
    Json(EdgeNodeDescriptor {
        id: state.node_id.clone(),
        url: state.node_url.clone(),
        capacity: state.capacity,
        connections: state.connection_count().await as i32,
    })
}

pub async fn healthz() -> &'static str {
    "ok"
}

pub async fn readyz() -> &'static str {
    "ok"
}
