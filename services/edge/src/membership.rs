use playback_protocol::ServerFrame;
use tokio::sync::mpsc;
use uuid::Uuid;

/// A single attached WebSocket connection within a session's membership set.
pub struct ClientConn {
    pub id: Uuid,
    pub is_host: bool,
    pub tx: mpsc::Sender<ServerFrame>,
}

/// The set of connections currently attached to one session on this node.
#[derive(Default)]
pub struct Membership {
    pub clients: Vec<ClientConn>,
}

impl Membership {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remove(&mut self, id: Uuid) {
        self.clients.retain(|c| c.id != id);
    }
}
