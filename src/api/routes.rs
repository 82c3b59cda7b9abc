use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::api::{handlers, state::AppState};

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        // Status endpoints
        .route("/api/status", get(handlers::get_status))
        // Cycle history endpoints
        .route("/api/cycles", get(handlers::list_cycles))
        .route("/api/cycles/:number", get(handlers::get_cycle))
        // Config endpoints
        .route("/api/config", get(handlers::get_config))
        .route("/api/config", axum::routing::patch(handlers::patch_config))
        // System control endpoints
        .route("/api/system/start", post(handlers::start_system))
        .route("/api/system/stop", post(handlers::stop_system))
        .route("/api/system/kill", post(handlers::kill_system))
        .with_state(state)
        .layer(cors)
}
