use axum::{extract::State, http::StatusCode, Json};

use crate::api::state::AppState;
use crate::api::types::ValidationErrorResponse;
use crate::config::{DualEntryConfig, DualEntryPatch};

/// GET /api/config -- live strategy configuration
pub async fn get_config(State(state): State<AppState>) -> Json<DualEntryConfig> {
    Json(state.engine.strategy_config().await)
}

/// PATCH /api/config -- partial update. Every present field is checked
/// against its bounds before any of them is merged; a rejected patch
/// changes nothing. Cycles already in flight are unaffected either way.
pub async fn patch_config(
    State(state): State<AppState>,
    Json(patch): Json<DualEntryPatch>,
) -> Result<Json<DualEntryConfig>, (StatusCode, Json<ValidationErrorResponse>)> {
    match state.engine.apply_patch(patch).await {
        Ok(merged) => Ok(Json(merged)),
        Err(violations) => Err((
            StatusCode::BAD_REQUEST,
            Json(ValidationErrorResponse {
                error: "config validation failed".to_string(),
                violations,
            }),
        )),
    }
}
