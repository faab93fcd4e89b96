pub mod http;
pub mod registry;
pub mod state;

pub use state::AppState;

use axum::{http::StatusCode, response::IntoResponse, routing::{get, post}, Router};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::OPTIONS,
        ]);

    Router::new()
        .route("/api/sessions", post(http::sessions::create_session))
        .route(
            "/api/sessions/:id/validate",
            get(http::sessions::validate_session),
        )
        .route("/api/sessions/:id", get(http::sessions::get_session))
        .route(
            "/api/streaming-servers/register",
            post(http::streaming_servers::register),
        )
        .route(
            "/api/streaming-servers/heartbeat",
            post(http::streaming_servers::heartbeat),
        )
        .route("/health", get(http::health::health))
        .route("/healthz", get(http::health::healthz))
        .route("/readyz", get(http::health::readyz))
        .fallback(fallback_404)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(handle_panic))
        .with_state(state)
}

async fn fallback_404() -> impl IntoResponse {
    StatusCode::NOT_FOUND
}

fn handle_panic(_err: Box<dyn std::any::Any + Send>) -> axum::response::Response {
    http::response::json_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        playback_protocol::error_codes::INTERNAL_ERROR,
        "internal server error",
    )
}
