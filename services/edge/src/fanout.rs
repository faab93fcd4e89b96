use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use playback_protocol::{PlaybackState, ServerFrame};
use session_store::SessionStore;
use tokio::sync::Mutex;
use tokio_stream::StreamExt;

use crate::membership::Membership;

/// Drains the cross-node pub/sub channel for one session and re-broadcasts
/// every update to the clients attached to this node.
///
/// One of these runs per session per node, for the lifetime of the node,
/// started the first time a client attaches to a session that this node
/// hasn't subscribed to yet. It is never torn down even after the last
/// local client leaves, so a returning client doesn't race a subscription
/// that is still shutting down.
pub async fn run_session_fanout(
    session_id: String,
    store: Arc<dyn SessionStore>,
    membership: Arc<Mutex<Membership>>,
) {
    let mut stream = match store.subscribe(&session_id).await {
        Ok(stream) => stream,
        Err(err) => {
            tracing::error!(session_id, %err, "failed to subscribe to session channel");
            return;
        }
    };

    while let Some(payload) = stream.next().await {
        let state: PlaybackState = match serde_json::from_slice(&payload) {
            Ok(state) => state,
            Err(err) => {
                tracing::warn!(session_id, %err, "dropping malformed fan-out payload");
                continue;
            }
        };

        let frame = ServerFrame::StateUpdate { state, servertime: now_ms() };

        // Copy the membership snapshot under the lock, then release it
        // before enqueueing, so a slow or growing client list never holds
        // up ATTACH/DRAIN on this session while we fan out (spec §4.4).
        let recipients: Vec<_> = {
            let guard = membership.lock().await;
            guard.clients.iter().map(|c| (c.id, c.tx.clone())).collect()
        };
        for (client_id, tx) in recipients {
            if tx.try_send(frame.clone()).is_err() {
                tracing::debug!(session_id, client_id = %client_id, "outbound queue full or closed, dropping frame");
            }
        }
    }

    tracing::info!(session_id, "session fan-out channel closed");
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_millis() as i64
}
