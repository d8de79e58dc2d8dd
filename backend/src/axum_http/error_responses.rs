use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use crates::domain::errors::SubscriptionError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    pub code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// The conflicting subscription, on 409.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i32>,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {message}")]
    Conflict { message: String, id: Option<i32> },

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict { .. } => StatusCode::CONFLICT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<SubscriptionError> for AppError {
    fn from(value: SubscriptionError) -> Self {
        match value {
            SubscriptionError::BadRequest(detail) => AppError::BadRequest(detail),
            SubscriptionError::NotFound => AppError::NotFound("subscription not found".to_string()),
            SubscriptionError::Conflict { id } => AppError::Conflict {
                message: "subscription with the same user_uuid and service_name already exists"
                    .to_string(),
                id,
            },
            SubscriptionError::Internal(err) => AppError::Internal(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = match self {
            AppError::BadRequest(detail) => ErrorResponse {
                code: status.as_u16(),
                message: "Invalid request".to_string(),
                detail: Some(detail),
                id: None,
            },
            AppError::NotFound(detail) => ErrorResponse {
                code: status.as_u16(),
                message: "Not found".to_string(),
                detail: Some(detail),
                id: None,
            },
            AppError::Conflict { message, id } => ErrorResponse {
                code: status.as_u16(),
                message,
                detail: None,
                id,
            },
            AppError::Internal(err) => {
                // Don't leak internal error detail to client
                error!(error = ?err, "http: internal server error");
                ErrorResponse {
                    code: status.as_u16(),
                    message: "Internal server error".to_string(),
                    detail: None,
                    id: None,
                }
            }
        };

        (status, Json(body)).into_response()
    }
}
