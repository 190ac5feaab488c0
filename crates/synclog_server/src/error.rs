//! Error types for the sync server.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use synclog_core::CoreError;
use synclog_protocol::ErrorBody;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the sync server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The body was not valid JSON of the expected shape.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Missing, malformed, forged or expired credentials.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The engine refused or failed the call.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        match self {
            ServerError::InvalidRequest(_) | ServerError::Unauthorized(_) => true,
            ServerError::Core(e) => e.is_client_error(),
            ServerError::Internal(_) | ServerError::Io(_) => false,
        }
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }

    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            e if e.is_client_error() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable code carried in the error body.
    pub fn code(&self) -> &'static str {
        match self {
            ServerError::InvalidRequest(_) => "invalid_request",
            ServerError::Unauthorized(_) => "unauthorized",
            ServerError::Core(e) if e.is_client_error() => "invalid_request",
            ServerError::Core(_) => "storage_failure",
            ServerError::Internal(_) | ServerError::Io(_) => "internal",
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ServerError::Core(CoreError::InvalidInput { message }) => message.clone(),
            e if e.is_client_error() => e.to_string(),
            e => {
                tracing::error!(error = %e, "request failed");
                "the request could not be completed".to_string()
            }
        };

        (status, Json(ErrorBody::new(self.code(), message))).into_response()
    }
}
