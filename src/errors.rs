// src/errors.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("State conflict: {0}")]
    StateConflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Gateway error: {0}")]
    GatewayError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Multipart error: {0}")]
    Multipart(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Insufficient role")]
    Forbidden,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::ValidationError(_) => (StatusCode::BAD_REQUEST, "Validation failed"),
            AppError::StateConflict(_) => (StatusCode::CONFLICT, "State conflict"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "Not found"),
            AppError::GatewayError(_) => (StatusCode::BAD_GATEWAY, "Payment gateway error"),
            AppError::StorageError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Storage error"),
            AppError::Multipart(_) => (StatusCode::BAD_REQUEST, "Invalid multipart data"),
            AppError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO error"),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "Insufficient role"),
        };

        let body = Json(json!({
            "error": error_message,
            "message": self.to_string(),
            "success": false,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }));

        (status, body).into_response()
    }
}

// Manual From implementations
impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::GatewayError(format!("HTTP request failed: {}", err))
    }
}

impl From<axum::extract::multipart::MultipartError> for AppError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        AppError::Multipart(err.to_string())
    }
}

// Helper conversion functions
impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::ValidationError(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        AppError::StateConflict(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        AppError::NotFound(msg.into())
    }

    pub fn gateway(msg: impl Into<String>) -> Self {
        AppError::GatewayError(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        AppError::StorageError(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
