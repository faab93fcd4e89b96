// session-store: abstraction over the shared KV / pub-sub backing store.
//
// The coordination service treats this store as an external dependency
// (spec §6): it owns the persisted `PlaybackState`, the host capability
// token, and the per-session broadcast channel that fans updates out
// across edge nodes. `RedisSessionStore` is the production implementation;
// `MemoryStore` is a same-trait double used by tests so the suite doesn't
// need a live broker.

pub mod memory;
pub mod redis_store;

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::Stream;
use playback_protocol::PlaybackState;

pub use memory::MemoryStore;
pub use redis_store::RedisSessionStore;

/// Default TTL for session records, refreshed on every accepted host write.
pub const SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("backend error: {0}")]
    Backend(String),
    #[error("session already exists: {0}")]
    AlreadyExists(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// A stream of raw pub/sub payloads delivered on a subscribed channel.
pub type MessageStream = Pin<Box<dyn Stream<Item = Vec<u8>> + Send>>;

/// The KV / pub-sub contract the control and edge nodes share.
///
/// Implementors are responsible for the literal key layout in spec §4.6:
/// `session:<id>`, `session:<id>:host`, `session:<id>:state`, and the
/// ephemeral channel `session-updates:<id>`.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Write the initial session record (streaming url, host token, state)
    /// as a single logical transaction with `ttl`.
    async fn create_session(
        &self,
        session_id: &str,
        streaming_url: &str,
        host_token: &str,
        state: PlaybackState,
        ttl: Duration,
    ) -> Result<()>;

    /// Whether a session record exists at all.
    async fn session_exists(&self, session_id: &str) -> Result<bool>;

    /// The edge node base URL a session was assigned at creation time.
    async fn get_streaming_url(&self, session_id: &str) -> Result<Option<String>>;

    /// The host capability token, for byte-for-byte comparison.
    async fn get_host_token(&self, session_id: &str) -> Result<Option<String>>;

    /// The last-known playback state, or `None` if the session doesn't exist.
    async fn get_playback_state(&self, session_id: &str) -> Result<Option<PlaybackState>>;

    /// Persist `state` and refresh the TTL on both the session and state
    /// keys (spec P5). Does not itself publish — callers publish
    /// separately so a write-without-broadcast (e.g. backfill) stays
    /// possible.
    async fn put_playback_state(
        &self,
        session_id: &str,
        state: PlaybackState,
        ttl: Duration,
    ) -> Result<()>;

    /// Publish a payload on `session-updates:<session_id>`.
    async fn publish(&self, session_id: &str, payload: &[u8]) -> Result<()>;

    /// Subscribe to `session-updates:<session_id>`. Each call gets its own
    /// independent stream; delivery is at-most-once per subscription and
    /// unacknowledged, per spec invariants.
    async fn subscribe(&self, session_id: &str) -> Result<MessageStream>;

    /// Count of currently live session records, for `GET /health`'s
    /// `sessions` field (spec §6). A session record whose TTL has elapsed
    /// doesn't count.
    async fn session_count(&self) -> Result<usize>;
}

/// Key helpers, shared by every implementation so the layout stays in one
/// place.
pub mod keys {
    #[must_use]
    pub fn session(id: &str) -> String {
        format!("session:{id}")
    }

    #[must_use]
    pub fn host(id: &str) -> String {
        format!("session:{id}:host")
    }

    #[must_use]
    pub fn state(id: &str) -> String {
        format!("session:{id}:state")
    }

    #[must_use]
    pub fn channel(id: &str) -> String {
        format!("session-updates:{id}")
    }
}
