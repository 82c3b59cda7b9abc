use axum::{extract::State, Json};

use crate::api::state::AppState;
use crate::api::types::{HealthResponse, StatusResponse};

/// GET /health -- lightweight liveness probe
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.uptime_seconds(),
    })
}

/// GET /api/status -- aggregate snapshot plus rollup analytics
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let snapshot = state.engine.status().await;
    let analytics = state.engine.analytics().await;
    Json(StatusResponse {
        snapshot,
        analytics,
        uptime_secs: state.uptime_seconds(),
    })
}
