//! Error types for the study backend
//!
//! Store and collector failures keep their own error enums; everything that
//! reaches an HTTP handler is a [`StudyError`].

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::collector::CollectorError;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum StudyError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid round {round}: {reason}")]
    InvalidRound { round: u32, reason: String },

    #[error("Unknown image: {0}")]
    UnknownImage(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Collector error: {0}")]
    Collector(#[from] CollectorError),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Score total of player {0} exceeds the representable range")]
    ScoreOverflow(String),

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type using StudyError
pub type StudyResult<T> = Result<T, StudyError>;

impl StudyError {
    pub fn status(&self) -> StatusCode {
        match self {
            StudyError::NotFound(_) | StudyError::UnknownImage(_) => StatusCode::NOT_FOUND,
            StudyError::InvalidRound { .. } | StudyError::BadRequest(_) => StatusCode::BAD_REQUEST,
            StudyError::ScoreOverflow(_) => StatusCode::UNPROCESSABLE_ENTITY,
            StudyError::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            StudyError::Store(StoreError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            StudyError::Store(StoreError::Conflict(_)) => StatusCode::CONFLICT,
            StudyError::Collector(CollectorError::NotFound(_)) => StatusCode::NOT_FOUND,
            StudyError::Collector(CollectorError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            StudyError::Collector(_) => StatusCode::BAD_GATEWAY,
            StudyError::Store(StoreError::Serialization(_))
            | StudyError::Catalog(_)
            | StudyError::Config(_)
            | StudyError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for StudyError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected: {}", self);
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}
