//! Error types for the parsing service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Result type alias for parsing service operations
pub type Result<T> = std::result::Result<T, Error>;

/// Parsing service errors
#[derive(Debug, Error)]
pub enum Error {
    /// Caller-supplied data is structurally wrong
    #[error("{0}")]
    InvalidInput(String),

    /// Referenced job does not exist (never created, consumed, or evicted)
    #[error("Unknown resource {0}")]
    NotFound(String),

    /// Operation is not valid for the job's current state
    #[error("{0}")]
    InvalidState(String),

    /// The isolated worker failed to start, crashed, or reported a failure
    #[error("{0}")]
    Worker(String),

    /// Workspace preparation or filesystem failure
    #[error("{0}")]
    Resource(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Archive error
    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create a not found error for a job key
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound(key.into())
    }

    /// Create an invalid state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    /// Create a worker error
    pub fn worker(message: impl Into<String>) -> Self {
        Self::Worker(message.into())
    }

    /// Create a resource error
    pub fn resource(message: impl Into<String>) -> Self {
        Self::Resource(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// HTTP status used when this error reaches a caller
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::InvalidInput(_) | Error::InvalidState(_) | Error::Json(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Worker(_)
            | Error::Resource(_)
            | Error::Config(_)
            | Error::Io(_)
            | Error::Zip(_)
            | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error body returned for every non-2xx response except 204 and 300:
/// `{error: true, code, message, detail}`
#[derive(Debug)]
pub struct ErrorResponse {
    status: StatusCode,
    message: String,
}

impl ErrorResponse {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Report `err` with an explicit status instead of its default one
    pub fn with_status(status: StatusCode, err: Error) -> Self {
        Self::new(status, err.to_string())
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<Error> for ErrorResponse {
    fn from(err: Error) -> Self {
        Self::new(err.status_code(), err.to_string())
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        let detail = if self.status.is_server_error() {
            "The parser could not complete the job."
        } else {
            "The request was rejected by the parsing service."
        };

        let body = Json(json!({
            "error": true,
            "code": self.status.as_u16(),
            "message": self.message,
            "detail": detail,
        }));

        (self.status, body).into_response()
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        ErrorResponse::from(self).into_response()
    }
}
