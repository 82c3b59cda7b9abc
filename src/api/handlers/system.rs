use axum::{extract::State, http::StatusCode, Json};

use crate::api::state::AppState;
use crate::api::types::ControlResponse;
use crate::error::DuetError;

/// POST /api/system/start -- rejected until both token ids are configured
pub async fn start_system(
    State(state): State<AppState>,
) -> Result<Json<ControlResponse>, (StatusCode, String)> {
    match state.engine.start().await {
        Ok(()) => Ok(Json(ControlResponse {
            running: true,
            message: "engine started".to_string(),
        })),
        Err(DuetError::MarketNotConfigured(reason)) => Err((StatusCode::CONFLICT, reason)),
        Err(e) => Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}

/// POST /api/system/stop -- stops cycle creation; in-flight cycles run out
pub async fn stop_system(State(state): State<AppState>) -> Json<ControlResponse> {
    state.engine.stop();
    Json(ControlResponse {
        running: false,
        message: "engine stopped, in-flight cycles continue".to_string(),
    })
}

/// POST /api/system/kill -- kill switch: stop and force-unwind everything
pub async fn kill_system(State(state): State<AppState>) -> Json<ControlResponse> {
    state.engine.kill();
    Json(ControlResponse {
        running: false,
        message: "kill switch tripped, in-flight cycles unwinding".to_string(),
    })
}
