//! Error handling for tutor-http
//!
//! Maps pipeline failures onto HTTP status codes with a `{"error": ...}` body.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tutor_core::logger::LogError;
use tutor_core::pipeline::PipelineError;

/// Application error type
#[derive(Debug, Error)]
pub enum AppError {
    /// Answer pipeline failure
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// Conversation log could not be read
    #[error("Log error: {0}")]
    Log(#[from] LogError),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PartialEq<StatusCode> for AppError {
    fn eq(&self, status_code: &StatusCode) -> bool {
        let (error_status, _) = self.status_and_message();
        &error_status == status_code
    }
}

impl AppError {
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            Self::Pipeline(err @ PipelineError::Timeout(_)) => {
                (StatusCode::GATEWAY_TIMEOUT, err.to_string())
            }
            Self::Pipeline(err @ PipelineError::Cancelled) => {
                (StatusCode::SERVICE_UNAVAILABLE, err.to_string())
            }
            Self::Pipeline(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
            Self::Log(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = self.status_and_message();
        if status.is_server_error() {
            tracing::error!("request failed: {}", error_message);
        }

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
