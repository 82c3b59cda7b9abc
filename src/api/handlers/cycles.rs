use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::api::state::AppState;
use crate::api::types::CycleResponse;

/// GET /api/cycles -- full history, ordered by cycle number
pub async fn list_cycles(State(state): State<AppState>) -> Json<Vec<CycleResponse>> {
    let cycles = state
        .engine
        .history()
        .await
        .into_iter()
        .map(CycleResponse::from)
        .collect();
    Json(cycles)
}

/// GET /api/cycles/:number
pub async fn get_cycle(
    State(state): State<AppState>,
    Path(number): Path<u64>,
) -> Result<Json<CycleResponse>, (StatusCode, String)> {
    match state.engine.cycle(number).await {
        Some(cycle) => Ok(Json(CycleResponse::from(cycle))),
        None => Err((
            StatusCode::NOT_FOUND,
            format!("cycle {number} not found"),
        )),
    }
}
