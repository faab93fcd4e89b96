use std::collections::HashMap;
use std::sync::Arc;

use session_store::SessionStore;
use tokio::sync::RwLock;

use crate::registry::SharedRegistry;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn SessionStore>,
    pub registry: SharedRegistry,
}

impl AppState {
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store,
            registry: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}
