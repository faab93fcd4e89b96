use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use session_store::SessionStore;
use tokio::sync::{Mutex, RwLock};

use crate::membership::Membership;

/// Shared state for one edge node process.
///
/// Generalizes the teacher's `AppState`: instead of a single global
/// broadcast channel it keeps one [`Membership`] per session, looked up by
/// session id, so that fan-out stays scoped to the clients that actually
/// joined that session.
#[derive(Clone)]
pub struct NodeState {
    pub store: Arc<dyn SessionStore>,
    sessions: Arc<RwLock<HashMap<String, Arc<Mutex<Membership>>>>>,
    subscribed: Arc<RwLock<HashSet<String>>>,
    connections: Arc<Mutex<i64>>,
    pub node_id: String,
    pub node_url: String,
    pub capacity: i32,
    pub http_client: reqwest::Client,
}

impl NodeState {
    pub fn new(store: Arc<dyn SessionStore>, node_id: String, node_url: String, capacity: i32) -> Self {
        Self {
            store,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            subscribed: Arc::new(RwLock::new(HashSet::new())),
            connections: Arc::new(Mutex::new(0)),
            node_id,
            node_url,
            capacity,
            http_client: reqwest::Client::new(),
        }
    }

    /// Returns the membership set for `session_id`, creating an empty one if
    /// this is the first connection this node has seen for that session.
    ///
    /// The entry is never removed once created (only the client list inside
    /// it shrinks back to empty) so that a fan-out listener task spawned
    /// against this `Arc` stays valid for the lifetime of the node.
    pub async fn get_or_create_membership(&self, session_id: &str) -> Arc<Mutex<Membership>> {
        if let Some(existing) = self.sessions.read().await.get(session_id) {
            return existing.clone();
        }
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session_id.to_owned())
            .or_insert_with(|| Arc::new(Mutex::new(Membership::new())))
            .clone()
    }

    /// Marks `session_id` as having an active fan-out subscription on this
    /// node. Returns `true` the first time it is called for a given session
    /// (the caller should spawn the listener task), `false` thereafter.
    pub async fn mark_subscribed(&self, session_id: &str) -> bool {
        let mut subscribed = self.subscribed.write().await;
        subscribed.insert(session_id.to_owned())
    }

    pub async fn inc_connections(&self) {
        *self.connections.lock().await += 1;
    }

    pub async fn dec_connections(&self) {
        *self.connections.lock().await -= 1;
    }

    pub async fn connection_count(&self) -> i64 {
        *self.connections.lock().await
    }
}
