use std::time::Duration;

use playback_protocol::EdgeNodeDescriptor;

use crate::state::NodeState;

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

fn descriptor(state: &NodeState, connections: i32) -> EdgeNodeDescriptor {
    EdgeNodeDescriptor {
        id: state.node_id.clone(),
        url: state.node_url.clone(),
        capacity: state.capacity,
        connections,
    }
}

/// Registers this node with the control node once at startup. Boot fails
/// loudly if this doesn't succeed — an edge node the control node doesn't
/// know about will never be selected for a session.
pub async fn register(state: &NodeState, control_url: &str) -> Result<(), reqwest::Error> {
    let body = descriptor(state, 0);
    state
        .http_client
        .post(format!("{control_url}/api/streaming-servers/register"))
        .json(&body)
        .send()
        .await?
        .error_for_status()?;
    Ok(())
}

/// Posts this node's current load to the control node on a fixed interval
/// for as long as the process runs. A single failed heartbeat is logged and
/// skipped rather than treated as fatal: the control node's sweep will
/// evict this node from the fleet if the outage persists.
pub async fn run_heartbeat_loop(state: NodeState, control_url: String) {
    let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
    loop {
        ticker.tick().await;
        let connections = state.connection_count().await as i32;
        let body = descriptor(&state, connections);
        let result = state
            .http_client
            .post(format!("{control_url}/api/streaming-servers/heartbeat"))
            .json(&body)
            .send()
            .await;
        match result {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => tracing::warn!(status = %response.status(), "heartbeat rejected by control node"),
            Err(err) => tracing::warn!(%err, "heartbeat request failed"),
        }
    }
}
