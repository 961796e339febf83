// src/error.rs
use crate::models::auth::ErrorResponse;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use thiserror::Error;
use uuid::Uuid;

const INTERNAL_MESSAGE: &str = "Internal Server Error. Please try again.";

/// Errors a request handler can surface to the client.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    /// No usable plan; `route` tells the client where to send the user.
    #[error("{message}")]
    AccessDenied { message: String, route: &'static str },
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    PayloadTooLarge(String),
    #[error("{0}")]
    QuotaExceeded(String),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Generation error: {0}")]
    Generation(#[from] crate::openai_client::GenerationError),
    #[error("{0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<Json<T>, AppError>;

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) | AppError::AccessDenied { .. } => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::QuotaExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Database(_) | AppError::Generation(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to show to the caller. Server-side failures are masked.
    pub fn public_message(&self) -> String {
        if self.status().is_server_error() {
            INTERNAL_MESSAGE.to_string()
        } else {
            self.to_string()
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Server failures carry an id that appears both in the log and the body
        let error_id = status.is_server_error().then(Uuid::new_v4);
        if let Some(error_id) = error_id {
            tracing::error!(error_id = %error_id, error = %self, "request failed");
        }

        let route = match &self {
            AppError::AccessDenied { route, .. } => Some(route.to_string()),
            _ => None,
        };

        (
            status,
            Json(ErrorResponse {
                success: false,
                error: self.public_message(),
                route,
                error_id: error_id.map(|id| id.to_string()),
            }),
        )
            .into_response()
    }
}
