// playback-protocol: wire types shared between the control node, edge nodes,
// and browser clients of the synchronized-playback coordination service.
//
// WebSocket messages use a top-level `type` field for discriminated
// deserialization. HTTP bodies use the same serde derives so the same types
// serve both transports where shapes coincide.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Core state
// ---------------------------------------------------------------------------

/// The playback tuple every participant in a session tries to mirror.
///
/// `timestamp` is the host's monotonic clock reading in milliseconds since
/// the epoch; accepted writes for a session are non-decreasing in this
/// field (see `PlaybackState::is_newer_than`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaybackState {
    pub paused: bool,
    #[serde(rename = "currentTime")]
    pub current_time: f64,
    #[serde(rename = "playbackRate")]
    pub playback_rate: f64,
    pub timestamp: i64,
}

impl PlaybackState {
    /// The state a freshly created session starts in: paused, at the
    /// beginning, at normal speed, stamped with the creation instant.
    #[must_use]
    pub fn initial(now_ms: i64) -> Self {
        Self {
            paused: true,
            current_time: 0.0,
            playback_rate: 1.0,
            timestamp: now_ms,
        }
    }

    /// Whether this state should replace `persisted` under the
    /// last-writer-wins rule (strictly newer timestamp only).
    #[must_use]
    pub fn is_newer_than(&self, persisted: &PlaybackState) -> bool {
        self.timestamp > persisted.timestamp
    }
}

/// Manifest describing a video's chunked layout, returned in response to a
/// `videoMetadata` frame. Actual chunk delivery is an external collaborator
/// (§1 Non-goals); only the reply contract lives here.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoManifest {
    #[serde(rename = "chunkDuration")]
    pub chunk_duration: i32,
    #[serde(rename = "chunkCount")]
    pub chunk_count: i32,
    #[serde(rename = "videoDuration")]
    pub video_duration: f64,
    #[serde(rename = "videoFileType")]
    pub video_file_type: String,
}

// ---------------------------------------------------------------------------
// WebSocket frames
// ---------------------------------------------------------------------------

/// Frames a client (host or participant) sends to its edge node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "camelCase")]
pub enum ClientFrame {
    StateUpdate { state: PlaybackState },
    VideoMetadata,
    Heartbeat,
}

/// Frames an edge node sends back to a connected client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "camelCase")]
pub enum ServerFrame {
    StateUpdate {
        state: PlaybackState,
        servertime: i64,
    },
    VideoMetadata {
        state: VideoManifest,
    },
    HeartbeatAck,
    Error {
        code: String,
        message: String,
    },
}

impl ServerFrame {
    #[must_use]
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Frozen v1 error codes carried on `ServerFrame::Error` and the HTTP error
/// envelope.
pub mod error_codes {
    pub const INVALID_SESSION: &str = "invalid_session";
    pub const INVALID_TOKEN: &str = "invalid_token";
    pub const PROTOCOL_ERROR: &str = "protocol_error";
    pub const SESSION_CREATION_FAILED: &str = "session_creation_failed";
    pub const HOST_REGISTRATION_FAILED: &str = "host_registration_failed";
    pub const NO_STREAMING_SERVERS_AVAILABLE: &str = "no_streaming_servers_available";
    pub const VALIDATION_ERROR: &str = "validation_error";
    pub const INTERNAL_ERROR: &str = "internal_error";
}

// ---------------------------------------------------------------------------
// Control-plane HTTP bodies
// ---------------------------------------------------------------------------

/// Response body for `POST /api/sessions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateSessionResponse {
    #[serde(rename = "sessionKey")]
    pub session_key: String,
    pub streaming_url: String,
    #[serde(rename = "hostToken")]
    pub host_token: String,
}

/// Response body for `GET /api/sessions/{id}/validate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidateSessionResponse {
    pub valid: bool,
    #[serde(rename = "isHost")]
    pub is_host: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub streaming_url: Option<String>,
}

impl ValidateSessionResponse {
    #[must_use]
    pub fn invalid() -> Self {
        Self {
            valid: false,
            is_host: false,
            streaming_url: None,
        }
    }
}

/// Descriptor an edge node sends to the control node on register/heartbeat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeNodeDescriptor {
    pub id: String,
    pub url: String,
    pub capacity: i32,
    pub connections: i32,
}

/// Frozen HTTP error envelope used by all non-2xx control-plane responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpErrorEnvelope {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Response body for `GET /health`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub servers: usize,
    pub sessions: usize,
}
