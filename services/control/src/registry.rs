//! Edge-node fleet registry: register/heartbeat bookkeeping, least-load
//! selection, and stale-entry eviction.
//!
//! The canonical read path is the in-memory map (spec §5: "Session registry
//! and edge-node registry are held in the KV store ... and in an in-memory
//! map protected by a read-write mutex"). Reads take a read lock; register
//! and heartbeat take a write lock. A dedicated sweep task evicts entries
//! that have stopped heartbeating.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::info;

/// How long an edge node may go without a heartbeat before it's evicted.
pub const T_EVICT: Duration = Duration::from_secs(60);
/// How often the sweep task checks for stale entries.
pub const T_SWEEP: Duration = Duration::from_secs(60);
/// Expected interval between an edge node's own heartbeat posts.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeStatus {
    Active,
    Stale,
}

#[derive(Debug, Clone)]
pub struct EdgeNode {
    pub id: String,
    pub url: String,
    pub capacity: i32,
    pub observed_load: i32,
    pub status: EdgeStatus,
    pub last_ping: Instant,
}

impl EdgeNode {
    fn load_ratio(&self) -> f64 {
        if self.capacity <= 0 {
            f64::INFINITY
        } else {
            f64::from(self.observed_load) / f64::from(self.capacity)
        }
    }
}

pub type SharedRegistry = Arc<RwLock<HashMap<String, EdgeNode>>>;

/// Select the active node with the lowest `observed_load / capacity`,
/// breaking ties lexicographically by id. `None` if no active node exists.
///
/// A pure function over a snapshot slice so it's trivial to unit test
/// without touching the registry's lock (spec P7).
#[must_use]
pub fn select_least_loaded(nodes: &[EdgeNode]) -> Option<&EdgeNode> {
    nodes
        .iter()
        .filter(|n| n.status == EdgeStatus::Active)
        .min_by(|a, b| {
            a.load_ratio()
                .partial_cmp(&b.load_ratio())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        })
}

/// Registers a node or refreshes its heartbeat fields. Returns the previous
/// entry, if any, so callers can log a register-vs-refresh distinction.
pub async fn upsert(
    registry: &SharedRegistry,
    id: String,
    url: String,
    capacity: i32,
    observed_load: i32,
) {
    let mut map = registry.write().await;
    map.insert(
        id.clone(),
        EdgeNode {
            id,
            url,
            capacity,
            observed_load,
            status: EdgeStatus::Active,
            last_ping: Instant::now(),
        },
    );
}

pub async fn snapshot(registry: &SharedRegistry) -> Vec<EdgeNode> {
    registry.read().await.values().cloned().collect()
}

/// Background task: evict registry entries that haven't heartbeated within
/// `T_EVICT`. Removed outright, no recovery state (spec §4.5).
pub async fn run_sweep(registry: SharedRegistry) {
    let mut ticker = tokio::time::interval(T_SWEEP);
    loop {
        ticker.tick().await;
        let mut map = registry.write().await;
        let before = map.len();
        map.retain(|_, node| node.last_ping.elapsed() <= T_EVICT);
        let evicted = before - map.len();
        if evicted > 0 {
            info!(evicted, remaining = map.len(), "swept stale edge nodes");
        }
    }
}
