use assigner_core::{Settings, Status};
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::app::AppState;
use super::error::ApiError;

#[derive(Deserialize, Serialize, Debug, PartialEq)]
pub struct ResetResponse {
    pub deleted: u64,
}

pub async fn get_status(State(state): State<AppState>) -> Result<Json<Status>, ApiError> {
    Ok(Json(state.assigner.status().await?))
}

pub async fn get_settings(State(state): State<AppState>) -> Result<Json<Settings>, ApiError> {
    Ok(Json(state.settings.get().await?))
}

pub async fn put_settings(
    State(state): State<AppState>,
    Json(payload): Json<Settings>,
) -> Result<Json<Settings>, ApiError> {
    if payload.group_count > state.max_groups {
        return Err(ApiError::TooManyGroups(state.max_groups));
    }

    let settings = state
        .settings
        .update(payload.total, payload.group_count)
        .await
        .map_err(ApiError::from_settings_update)?;

    Ok(Json(settings))
}

pub async fn post_reset(State(state): State<AppState>) -> Result<Json<ResetResponse>, ApiError> {
    warn!("resetting all assignments on request");
    let deleted = state.settings.reset_assignments().await?;

    Ok(Json(ResetResponse { deleted }))
}
