//! In-memory `SessionStore` double used by the integration test suites.
//!
//! Stands in for a real Redis instance: same trait, same key layout
//! conceptually, just a `HashMap` guarded by a `Mutex` plus one broadcast
//! channel per session for pub/sub. TTL is tracked as an expiry instant and
//! checked lazily on read rather than swept by a background task, since no
//! test waits out a real 24h TTL.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use playback_protocol::PlaybackState;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::{keys, MessageStream, Result, SessionStore, StoreError};

struct Entry {
    value: String,
    expires_at: Instant,
}

#[derive(Default)]
struct Inner {
    records: HashMap<String, Entry>,
    channels: HashMap<String, broadcast::Sender<Vec<u8>>>,
}

/// A `SessionStore` backed by process memory.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn get_live(inner: &Inner, key: &str) -> Option<String> {
        inner
            .records
            .get(key)
            .filter(|e| e.expires_at > Instant::now())
            .map(|e| e.value.clone())
    }

    fn set(inner: &mut Inner, key: String, value: String, ttl: Duration) {
        inner.records.insert(
            key,
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    fn channel(inner: &mut Inner, session_id: &str) -> broadcast::Sender<Vec<u8>> {
        inner
            .channels
            .entry(keys::channel(session_id))
            .or_insert_with(|| broadcast::channel(1024).0)
            .clone()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create_session(
        &self,
        session_id: &str,
        streaming_url: &str,
        host_token: &str,
        state: PlaybackState,
        ttl: Duration,
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if Self::get_live(&inner, &keys::session(session_id)).is_some() {
            return Err(StoreError::AlreadyExists(session_id.to_owned()));
        }
        let state_json = serde_json::to_string(&state)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Self::set(&mut inner, keys::session(session_id), streaming_url.to_owned(), ttl);
        Self::set(&mut inner, keys::host(session_id), host_token.to_owned(), ttl);
        Self::set(&mut inner, keys::state(session_id), state_json, ttl);
        Ok(())
    }

    async fn session_exists(&self, session_id: &str) -> Result<bool> {
        let inner = self.inner.lock().unwrap();
        Ok(Self::get_live(&inner, &keys::session(session_id)).is_some())
    }

    async fn get_streaming_url(&self, session_id: &str) -> Result<Option<String>> {
        let inner = self.inner.lock().unwrap();
        Ok(Self::get_live(&inner, &keys::session(session_id)))
    }

    async fn get_host_token(&self, session_id: &str) -> Result<Option<String>> {
        let inner = self.inner.lock().unwrap();
        Ok(Self::get_live(&inner, &keys::host(session_id)))
    }

    async fn get_playback_state(&self, session_id: &str) -> Result<Option<PlaybackState>> {
        let inner = self.inner.lock().unwrap();
        match Self::get_live(&inner, &keys::state(session_id)) {
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
        let mut inner = self.inner.lock().unwrap();
        let state_json = serde_json::to_string(&state)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        // Refresh both the session record's and the state key's TTL (P5);
        // the session record's value (streaming url) doesn't change.
        if let Some(url) = Self::get_live(&inner, &keys::session(session_id)) {
            Self::set(&mut inner, keys::session(session_id), url, ttl);
        }
        Self::set(&mut inner, keys::state(session_id), state_json, ttl);
        Ok(())
    }

    async fn publish(&self, session_id: &str, payload: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let tx = Self::channel(&mut inner, session_id);
        // No subscribers is not an error: pub/sub delivery is fire-and-forget.
        let _ = tx.send(payload.to_vec());
        Ok(())
    }

    async fn subscribe(&self, session_id: &str) -> Result<MessageStream> {
        let mut inner = self.inner.lock().unwrap();
        let tx = Self::channel(&mut inner, session_id);
        let rx = tx.subscribe();
        let stream = BroadcastStream::new(rx).filter_map(|item| item.ok());
        Ok(Box::pin(stream))
    }

    async fn session_count(&self) -> Result<usize> {
        let inner = self.inner.lock().unwrap();
        let now = Instant::now();
        Ok(inner
            .records
            .iter()
            .filter(|(key, entry)| is_session_record_key(key) && entry.expires_at > now)
            .count())
    }
}

/// A record key is a bare `session:<id>` key, not the `:host`/`:state`
/// suffixed companions that share the same prefix.
fn is_session_record_key(key: &str) -> bool {
    key.starts_with("session:") && !key.ends_with(":host") && !key.ends_with(":state")
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    fn state(ts: i64) -> PlaybackState {
        PlaybackState {
            paused: false,
            current_time: 1.0,
            playback_rate: 1.0,
            timestamp: ts,
        }
    }

    #[tokio::test]
    async fn create_session_writes_all_three_keys() {
        let store = MemoryStore::new();
        store
            .create_session("s1", "http://edge-1", "tok", state(1000), Duration::from_secs(60))
            .await
            .unwrap();

        assert!(store.session_exists("s1").await.unwrap());
        assert_eq!(
            store.get_streaming_url("s1").await.unwrap(),
            Some("http://edge-1".to_owned())
        );
        assert_eq!(store.get_host_token("s1").await.unwrap(), Some("tok".to_owned()));
        assert_eq!(store.get_playback_state("s1").await.unwrap(), Some(state(1000)));
    }

    #[tokio::test]
    async fn create_session_twice_fails() {
        let store = MemoryStore::new();
        store
            .create_session("s1", "url", "tok", state(0), Duration::from_secs(60))
            .await
            .unwrap();
        let err = store
            .create_session("s1", "url2", "tok2", state(0), Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn unknown_session_reads_return_none() {
        let store = MemoryStore::new();
        assert_eq!(store.get_playback_state("missing").await.unwrap(), None);
        assert!(!store.session_exists("missing").await.unwrap());
    }

    #[tokio::test]
    async fn put_playback_state_overwrites_and_refreshes() {
        let store = MemoryStore::new();
        store
            .create_session("s1", "url", "tok", state(1000), Duration::from_secs(60))
            .await
            .unwrap();
        store
            .put_playback_state("s1", state(2000), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(store.get_playback_state("s1").await.unwrap(), Some(state(2000)));
    }

    #[tokio::test]
    async fn publish_then_subscribe_misses_earlier_messages() {
        let store = MemoryStore::new();
        store.publish("s1", b"before").await.unwrap();
        let mut stream = store.subscribe("s1").await.unwrap();
        store.publish("s1", b"after").await.unwrap();
        let msg = stream.next().await.unwrap();
        assert_eq!(msg, b"after");
    }

    #[tokio::test]
    async fn two_subscribers_both_receive_the_same_publish() {
        let store = MemoryStore::new();
        let mut a = store.subscribe("s1").await.unwrap();
        let mut b = store.subscribe("s1").await.unwrap();
        store.publish("s1", b"hello").await.unwrap();
        assert_eq!(a.next().await.unwrap(), b"hello");
        assert_eq!(b.next().await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn session_count_reflects_live_records_only() {
        let store = MemoryStore::new();
        assert_eq!(store.session_count().await.unwrap(), 0);

        store
            .create_session("s1", "url", "tok", state(0), Duration::from_secs(60))
            .await
            .unwrap();
        store
            .create_session("s2", "url", "tok", state(0), Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(store.session_count().await.unwrap(), 2);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.session_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn expired_ttl_hides_a_session() {
        let store = MemoryStore::new();
        store
            .create_session("s1", "url", "tok", state(0), Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!store.session_exists("s1").await.unwrap());
        assert_eq!(store.get_playback_state("s1").await.unwrap(), None);
    }
}
