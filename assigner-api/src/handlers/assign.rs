use assigner_core::Assignment;
use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::app::AppState;
use super::error::ApiError;

pub const MAX_TOKEN_LENGTH: usize = 256;

#[derive(Deserialize, Serialize, Debug)]
pub struct AssignRequest {
    pub token: String,
}

#[derive(Deserialize, Serialize, Debug, PartialEq)]
pub struct AssignResponse {
    pub token: String,
    pub group: u32,
}

pub async fn post_assign(
    State(state): State<AppState>,
    Json(payload): Json<AssignRequest>,
) -> Result<Json<AssignResponse>, ApiError> {
    validate_token(&payload.token)?;

    let group = state
        .assigner
        .assign_with_retry(&payload.token, &state.retry_policy)
        .await?;
    debug!(group, "answered assignment request");

    Ok(Json(AssignResponse {
        token: payload.token,
        group,
    }))
}

pub async fn get_assignment(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<Assignment>, ApiError> {
    validate_token(&token)?;

    state
        .assigner
        .lookup(&token)
        .await?
        .map(Json)
        .ok_or(ApiError::AssignmentNotFound)
}

fn validate_token(token: &str) -> Result<(), ApiError> {
    if token.is_empty() {
        return Err(ApiError::EmptyToken);
    }
    if token.len() > MAX_TOKEN_LENGTH {
        return Err(ApiError::TokenTooLong(MAX_TOKEN_LENGTH));
    }
    Ok(())
}
