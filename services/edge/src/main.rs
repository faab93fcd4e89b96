use std::env;
use std::sync::Arc;

use edge::heartbeat::{register, run_heartbeat_loop};
use edge::state::NodeState;
use session_store::{RedisSessionStore, SessionStore};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[tokio::main]
async fn main() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level))
        .init();

    let redis_url = env::var("REDIS_URL").expect("REDIS_URL must be set");
    let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8081".to_owned());
    let control_url = env::var("CONTROL_URL").expect("CONTROL_URL must be set");
    let node_id = env::var("NODE_ID").unwrap_or_else(|_| Uuid::new_v4().to_string());
    let node_url = env::var("NODE_URL").unwrap_or_else(|_| format!("http://{bind_addr}"));
    let capacity: i32 = env::var("CAPACITY")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(100);

    info!("connecting to session store...");
    let store = RedisSessionStore::connect(&redis_url)
        .await
        .expect("failed to connect to session store");
    let store: Arc<dyn SessionStore> = Arc::new(store);

    let state = NodeState::new(store, node_id.clone(), node_url.clone(), capacity);

    if let Err(err) = register(&state, &control_url).await {
        error!(%err, "initial registration with control node failed, continuing anyway");
    }
    tokio::spawn(run_heartbeat_loop(state.clone(), control_url));

    let router = edge::build_router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("failed to bind");
    info!(addr = %bind_addr, node_id, "edge node listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
    info!("edge node shut down gracefully");
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("received Ctrl+C, shutting down"); },
        _ = terminate => { info!("received SIGTERM, shutting down"); },
    }
}
