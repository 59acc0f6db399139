//! Error types and error handling for the application
//!
//! This module defines the application-level error enum and its conversion
//! to HTTP responses. Only faults that make the whole request unservable
//! live here; a failure local to one plan step is converted into a Result
//! Record by the coordinator and never surfaces as an `AppError`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application-level error types
///
/// Each variant implements automatic conversion to an HTTP response via
/// `IntoResponse`.
#[derive(Error, Debug)]
pub enum AppError {
    /// The submitted query is malformed (empty, too long, ...)
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// A plan step declared an intent with no registered handler.
    /// Configuration fault, always fatal.
    #[error("No tool registered for intent: {0}")]
    Routing(String),

    /// A configuration update failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Operation timed out
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Internal server error (catch-all for unexpected errors)
    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::InvalidQuery(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::Routing(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            AppError::InvalidConfig(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::Timeout(_) => (StatusCode::REQUEST_TIMEOUT, self.to_string()),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}
