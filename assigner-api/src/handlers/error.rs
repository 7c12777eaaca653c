use assigner_core::AssignError;
use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

#[derive(Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("token must not be empty")]
    EmptyToken,
    #[error("token must be at most {0} bytes")]
    TokenTooLong(usize),
    #[error("no assignment found for token")]
    AssignmentNotFound,
    #[error("groups must be at most {0}")]
    TooManyGroups(i64),
    /// Settings submitted by the caller failed validation.
    #[error("{0}")]
    InvalidSettings(AssignError),
    #[error(transparent)]
    Engine(#[from] AssignError),
}

impl ApiError {
    /// Like `From<AssignError>`, but blames the request for a configuration error instead of the
    /// stored settings.
    pub fn from_settings_update(error: AssignError) -> Self {
        match error {
            AssignError::InvalidConfiguration { .. } => ApiError::InvalidSettings(error),
            other => ApiError::Engine(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::EmptyToken
            | ApiError::TokenTooLong(_)
            | ApiError::TooManyGroups(_)
            | ApiError::InvalidSettings(_) => StatusCode::BAD_REQUEST,

            ApiError::AssignmentNotFound => StatusCode::NOT_FOUND,

            // The stored settings are broken, nothing the caller sent can fix that.
            ApiError::Engine(AssignError::InvalidConfiguration { .. }) => StatusCode::CONFLICT,

            ApiError::Engine(AssignError::TransactionConflict(reason)) => {
                warn!("giving up on conflicted request: {}", reason);
                let body = Json(ErrorResponse {
                    error: self.to_string(),
                });
                return (
                    StatusCode::SERVICE_UNAVAILABLE,
                    [(header::RETRY_AFTER, "1")],
                    body,
                )
                    .into_response();
            }

            ApiError::Engine(AssignError::StorageUnavailable(reason)) => {
                error!("storage unavailable: {}", reason);
                StatusCode::SERVICE_UNAVAILABLE
            }
        };

        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}
