use axum::{http::StatusCode, response::IntoResponse, Json};
use thiserror::Error;

use crate::client::CredentialSlot;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing credential: {}", .0.error_code())]
    MissingCredential(CredentialSlot),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        match &self {
            // Mirrors the status snapshot shape so the admin page can render it as-is.
            AppError::MissingCredential(slot) => (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({
                    "running": false,
                    "paused": false,
                    "error": slot.error_code(),
                })),
            )
                .into_response(),
            // Json only arises from request bodies; upstream decoding fails as Http.
            AppError::BadRequest(_) | AppError::Json(_) => {
                (StatusCode::BAD_REQUEST, self.to_string()).into_response()
            }
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()).into_response(),
            AppError::Http(_) | AppError::Upstream(_) => {
                (StatusCode::BAD_GATEWAY, self.to_string()).into_response()
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response(),
        }
    }
}
