pub mod fanout;
pub mod heartbeat;
pub mod http;
pub mod membership;
pub mod state;
pub mod ws;

pub use state::NodeState;

use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub fn build_router(state: NodeState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET, axum::http::Method::OPTIONS]);

    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/status", get(http::status))
        .route("/healthz", get(http::healthz))
        .route("/readyz", get(http::readyz))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
