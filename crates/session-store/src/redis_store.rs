//! Redis-backed `SessionStore`.
//!
//! Commands go through a shared `ConnectionManager` (reconnects
//! transparently on transient failures). Pub/sub is different: Redis
//! multiplexes commands but not subscriptions onto one connection, so per
//! the design note in spec §9 ("an implementer must maintain a set of
//! subscriptions keyed by sessionId, each owned by a dedicated listener
//! task") every `subscribe` call opens its own connection and hands back a
//! stream driven by a task dedicated to that one channel.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use playback_protocol::PlaybackState;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::warn;

use crate::{keys, MessageStream, Result, SessionStore, StoreError};

#[derive(Clone)]
pub struct RedisSessionStore {
    client: redis::Client,
    conn: ConnectionManager,
}

impl RedisSessionStore {
    /// Connect to `redis_url` and eagerly establish the managed connection
    /// used for ordinary commands.
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client =
            redis::Client::open(redis_url).map_err(|e| StoreError::Backend(e.to_string()))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(Self { client, conn })
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn create_session(
        &self,
        session_id: &str,
        streaming_url: &str,
        host_token: &str,
        state: PlaybackState,
        ttl: Duration,
    ) -> Result<()> {
        let state_json =
            serde_json::to_string(&state).map_err(|e| StoreError::Backend(e.to_string()))?;
        let ttl_secs = ttl.as_secs();
        let mut conn = self.conn.clone();

        let existing: bool = conn
            .exists(keys::session(session_id))
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        if existing {
            return Err(StoreError::AlreadyExists(session_id.to_owned()));
        }

        redis::pipe()
            .atomic()
            .set_ex(keys::session(session_id), streaming_url, ttl_secs)
            .ignore()
            .set_ex(keys::host(session_id), host_token, ttl_secs)
            .ignore()
            .set_ex(keys::state(session_id), &state_json, ttl_secs)
            .ignore()
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn session_exists(&self, session_id: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        conn.exists(keys::session(session_id))
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn get_streaming_url(&self, session_id: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(keys::session(session_id))
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn get_host_token(&self, session_id: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(keys::host(session_id))
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn get_playback_state(&self, session_id: &str) -> Result<Option<PlaybackState>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .get(keys::state(session_id))
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        match raw {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| StoreError::Backend(e.to_string())),
            None => Ok(None),
        }
    }

    async fn put_playback_state(
        &self,
        session_id: &str,
        state: PlaybackState,
        ttl: Duration,
    ) -> Result<()> {
        let state_json =
            serde_json::to_string(&state).map_err(|e| StoreError::Backend(e.to_string()))?;
        let ttl_secs = ttl.as_secs();
        let mut conn = self.conn.clone();

        // Refresh the TTL on the session record too (P5), without clobbering
        // its value — EXPIRE leaves the stored streaming url untouched.
        redis::pipe()
            .atomic()
            .set_ex(keys::state(session_id), &state_json, ttl_secs)
            .ignore()
            .expire(keys::session(session_id), ttl_secs as i64)
            .ignore()
            .expire(keys::host(session_id), ttl_secs as i64)
            .ignore()
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn publish(&self, session_id: &str, payload: &[u8]) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.publish::<_, _, ()>(keys::channel(session_id), payload)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn session_count(&self) -> Result<usize> {
        let mut conn = self.conn.clone();
        // SCAN rather than KEYS so a large fleet-wide session count doesn't
        // block the shared connection manager; filter out the `:host` and
        // `:state` companion keys so only the bare session record counts.
        let mut iter: redis::AsyncIter<String> = conn
            .scan_match("session:*")
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let mut count = 0usize;
        while let Some(key) = iter.next_item().await {
            if !key.ends_with(":host") && !key.ends_with(":state") {
                count += 1;
            }
        }
        Ok(count)
    }

    async fn subscribe(&self, session_id: &str) -> Result<MessageStream> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        pubsub
            .subscribe(keys::channel(session_id))
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            match msg.get_payload::<Vec<u8>>() {
                Ok(payload) => Some(payload),
                Err(e) => {
                    warn!(error = %e, "dropping undecodable pub/sub payload");
                    None
                }
            }
        });
        Ok(Box::pin(stream))
    }
}
