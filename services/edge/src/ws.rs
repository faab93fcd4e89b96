use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use playback_protocol::{error_codes, ClientFrame, PlaybackState, ServerFrame, VideoManifest};
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::fanout::run_session_fanout;
use crate::membership::ClientConn;
use crate::state::NodeState;

/// Bounded so a slow or stalled client can't grow memory without limit; a
/// full queue means we drop the update rather than block the fan-out task.
const OUTBOUND_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Deserialize)]
pub struct AttachParams {
    #[serde(rename = "sessionID")]
    pub session_id: String,
    #[serde(rename = "hostToken")]
    pub host_token: Option<String>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<AttachParams>,
    State(state): State<NodeState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_client_socket(socket, params, state))
}

/// Runs the full lifecycle of one client connection: HANDSHAKE (params
/// already parsed by the extractor), ATTACH (membership + subscription),
/// ACTIVE (reader loop driving a spawned writer task), and DRAIN (teardown
/// on either task's exit).
///
/// Generalizes the teacher's split between `ws_forwarder.rs` (talks to the
/// upstream timer hardware) and `ws_receiver.rs` (talks to a browser
/// client) into a single handler, since here both ends of a session speak
/// the same frame protocol.
async fn handle_client_socket(socket: WebSocket, params: AttachParams, state: NodeState) {
    let session_id = params.session_id;

    let exists = match state.store.session_exists(&session_id).await {
        Ok(exists) => exists,
        Err(err) => {
            tracing::error!(session_id, %err, "store lookup failed during attach");
            send_error_and_close(socket, error_codes::INTERNAL_ERROR, "session lookup failed").await;
            return;
        }
    };
    if !exists {
        send_error_and_close(socket, error_codes::INVALID_SESSION, "unknown session").await;
        return;
    }

    let is_host = match (&params.host_token, state.store.get_host_token(&session_id).await) {
        (Some(supplied), Ok(Some(actual))) => *supplied == actual,
        _ => false,
    };

    let membership = state.get_or_create_membership(&session_id).await;
    if state.mark_subscribed(&session_id).await {
        tokio::spawn(run_session_fanout(
            session_id.clone(),
            state.store.clone(),
            membership.clone(),
        ));
    }

    let conn_id = Uuid::new_v4();
    let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
    membership.lock().await.clients.push(ClientConn { id: conn_id, is_host, tx: tx.clone() });
    state.inc_connections().await;

    let (mut sink, mut stream) = socket.split();

    if !is_host {
        match state.store.get_playback_state(&session_id).await {
            Ok(Some(playback_state)) => {
                let frame = ServerFrame::StateUpdate { state: playback_state, servertime: now_ms() };
                if let Err(err) = send_frame(&mut sink, &frame).await {
                    tracing::debug!(session_id, %err, "client disconnected before initial state send");
                }
            }
            Ok(None) => {}
            Err(err) => tracing::warn!(session_id, %err, "failed to load initial playback state"),
        }
    }

    let writer = tokio::spawn(run_writer(sink, rx));

    run_reader(&mut stream, &state, &session_id, is_host, &tx).await;

    // Dropping our own sender and removing the membership entry releases
    // every reference to `tx`; once the last one is gone the writer's
    // channel closes and it exits on its own.
    drop(tx);
    membership.lock().await.remove(conn_id);
    state.dec_connections().await;
    let _ = writer.await;
}

async fn run_writer(
    mut sink: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<ServerFrame>,
) {
    while let Some(frame) = rx.recv().await {
        if send_frame(&mut sink, &frame).await.is_err() {
            break;
        }
    }
}

async fn run_reader(
    stream: &mut futures_util::stream::SplitStream<WebSocket>,
    state: &NodeState,
    session_id: &str,
    is_host: bool,
    tx: &mpsc::Sender<ServerFrame>,
) {
    while let Some(message) = stream.next().await {
        let message = match message {
            Ok(message) => message,
            Err(err) => {
                tracing::debug!(session_id, %err, "websocket read error, closing");
                break;
            }
        };
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let frame: ClientFrame = match serde_json::from_str(&text) {
            Ok(frame) => frame,
            Err(_) => {
                let _ = tx
                    .try_send(ServerFrame::error(error_codes::PROTOCOL_ERROR, "malformed frame"));
                continue;
            }
        };

        match frame {
            ClientFrame::Heartbeat => {
                let _ = tx.try_send(ServerFrame::HeartbeatAck);
            }
            ClientFrame::VideoMetadata => {
                // Chunk/segment delivery itself is an external collaborator
                // (§1 Non-goals); the manifest values here are a fixed
                // placeholder since no byte-range server is wired in, but
                // the reply contract a client expects on this frame is.
                let _ = tx.try_send(ServerFrame::VideoMetadata {
                    state: placeholder_manifest(),
                });
            }
            ClientFrame::StateUpdate { state: incoming } => {
                if !is_host {
                    // Spec §4.3.3: non-host stateUpdate frames are silently
                    // dropped, not rejected with an error frame.
                    tracing::debug!(session_id, "dropping stateUpdate from a non-host connection");
                    continue;
                }
                apply_state_update(state, session_id, incoming, tx).await;
            }
        }
    }
}

async fn apply_state_update(
    state: &NodeState,
    session_id: &str,
    incoming: PlaybackState,
    tx: &mpsc::Sender<ServerFrame>,
) {
    let current = match state.store.get_playback_state(session_id).await {
        Ok(current) => current,
        Err(err) => {
            tracing::warn!(session_id, %err, "failed to read current state before update");
            let _ = tx.try_send(ServerFrame::error(error_codes::INTERNAL_ERROR, "store error"));
            return;
        }
    };
    if let Some(current) = current {
        if !incoming.is_newer_than(&current) {
            return;
        }
    }
    if let Err(err) = state
        .store
        .put_playback_state(session_id, incoming, session_store::SESSION_TTL)
        .await
    {
        tracing::warn!(session_id, %err, "failed to persist state update");
        let _ = tx.try_send(ServerFrame::error(error_codes::INTERNAL_ERROR, "store error"));
        return;
    }
    let payload = match serde_json::to_vec(&incoming) {
        Ok(payload) => payload,
        Err(_) => return,
    };
    if let Err(err) = state.store.publish(session_id, &payload).await {
        tracing::warn!(session_id, %err, "failed to publish state update");
    }
}

async fn send_frame(
    sink: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    frame: &ServerFrame,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(frame).expect("ServerFrame always serializes");
    sink.send(Message::Text(text)).await
}

/// Closes a connection that failed authorization at ATTACH time. Sends the
/// error frame first so a client that only inspects message payloads still
/// sees a reason, then closes with 4001 for clients that check the code.
async fn send_error_and_close(mut socket: WebSocket, code: &str, message: &str) {
    let frame = ServerFrame::error(code, message);
    let text = serde_json::to_string(&frame).expect("ServerFrame always serializes");
    let _ = socket.send(Message::Text(text)).await;
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: 4001,
            reason: message.to_owned().into(),
        })))
        .await;
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_millis() as i64
}

/// Fixed manifest returned for `videoMetadata` frames. Real chunk layout
/// lives with the byte-range/HLS server this node doesn't implement (§1
/// Non-goals); this keeps the wire contract answerable regardless.
fn placeholder_manifest() -> VideoManifest {
    VideoManifest {
        chunk_duration: 10,
        chunk_count: 0,
        video_duration: 0.0,
        video_file_type: "video/mp4".to_owned(),
    }
}
