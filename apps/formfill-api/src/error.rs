//! Error types for the formfill API

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use formfill_core::{ErrorCategory, ErrorKind, FormFillError};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Core(#[from] FormFillError),

    #[error("Form not found: {0}")]
    FormNotFound(String),

    #[error("Page {page} out of range (1..={total})")]
    PageOutOfRange { page: usize, total: usize },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        ApiError::Internal(format!("worker task failed: {}", e))
    }
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
    code: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Core(e) => match e.kind() {
                ErrorKind::SessionNotFound => StatusCode::NOT_FOUND,
                kind => match kind.category() {
                    ErrorCategory::Input => StatusCode::BAD_REQUEST,
                    ErrorCategory::Document => StatusCode::UNPROCESSABLE_ENTITY,
                    ErrorCategory::Transient => StatusCode::INTERNAL_SERVER_ERROR,
                },
            },
            ApiError::FormNotFound(_) | ApiError::PageOutOfRange { .. } => StatusCode::NOT_FOUND,
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Core(e) => e.kind().as_str(),
            ApiError::FormNotFound(_) => "FORM_NOT_FOUND",
            ApiError::PageOutOfRange { .. } => "PAGE_NOT_FOUND",
            ApiError::InvalidRequest(_) => "INVALID_REQUEST",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.code(), "{}", self);
        } else {
            tracing::debug!(code = self.code(), "{}", self);
        }

        let body = ErrorResponse {
            success: false,
            error: self.to_string(),
            code: self.code().to_string(),
        };
        (status, Json(body)).into_response()
    }
}
