/// Error types for Journal Service
///
/// Every fallible operation in the service returns [`AppError`]. Errors are
/// converted to JSON HTTP responses for API clients; backend details are logged
/// but never leaked beyond a short message.
use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::services::storage::StorageError;
use crate::services::upload::UploadError;

/// Result type for journal-service operations
pub type Result<T> = std::result::Result<T, AppError>;

/// Stable machine-readable error codes
pub mod error_codes {
    pub const DATABASE_ERROR: &str = "DATABASE_ERROR";
    pub const STORAGE_ERROR: &str = "STORAGE_ERROR";
    pub const UPLOAD_FAILED: &str = "UPLOAD_FAILED";
    pub const UPLOAD_CANCELLED: &str = "UPLOAD_CANCELLED";
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const POST_NOT_FOUND: &str = "POST_NOT_FOUND";
    pub const INVALID_CREDENTIALS: &str = "INVALID_CREDENTIALS";
    pub const UPSTREAM_ERROR: &str = "UPSTREAM_ERROR";
    pub const INTERNAL_SERVER_ERROR: &str = "INTERNAL_SERVER_ERROR";
}

/// JSON body returned for every error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status: u16,
    pub error_type: String,
    pub code: String,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str, status: u16, error_type: &str, code: &str) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
            status,
            error_type: error_type.to_string(),
            code: code.to_string(),
        }
    }
}

/// Application error types
#[derive(Debug)]
pub enum AppError {
    /// Database operation failed
    DatabaseError(String),

    /// Object storage operation failed
    StorageError(String),

    /// File upload batch aborted
    UploadFailed(String),

    /// File upload batch cancelled by the caller
    UploadCancelled,

    /// Validation failed
    ValidationError(String),

    /// Resource not found
    NotFound(String),

    /// Unauthorized access
    Unauthorized(String),

    /// Forbidden access
    Forbidden(String),

    /// Facts proxy or other upstream dependency failed
    Upstream(String),

    /// Internal server error
    Internal(String),

    /// Bad request
    BadRequest(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::DatabaseError(msg) => write!(f, "Database error: {}", msg),
            AppError::StorageError(msg) => write!(f, "Storage error: {}", msg),
            AppError::UploadFailed(msg) => write!(f, "Upload failed: {}", msg),
            AppError::UploadCancelled => write!(f, "Upload cancelled"),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            AppError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            AppError::Upstream(msg) => write!(f, "Upstream error: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl AppError {
    /// Message that is safe to show to an end user.
    ///
    /// Backend failures collapse to a generic sentence; the detail is logged.
    pub fn public_message(&self) -> String {
        match self {
            AppError::DatabaseError(_) | AppError::StorageError(_) | AppError::Internal(_) => {
                "Something went wrong. Please try again.".to_string()
            }
            AppError::Upstream(_) => "An external service is unavailable.".to_string(),
            other => other.to_string(),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::DatabaseError(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::StorageError(_) | AppError::UploadFailed(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::UploadCancelled => StatusCode::CONFLICT,
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let (error_type, code) = match self {
            AppError::DatabaseError(_) => ("server_error", error_codes::DATABASE_ERROR),
            AppError::StorageError(_) => ("server_error", error_codes::STORAGE_ERROR),
            AppError::UploadFailed(_) => ("server_error", error_codes::UPLOAD_FAILED),
            AppError::UploadCancelled => ("conflict_error", error_codes::UPLOAD_CANCELLED),
            AppError::ValidationError(_) => ("validation_error", error_codes::VALIDATION_ERROR),
            AppError::NotFound(_) => ("not_found_error", error_codes::POST_NOT_FOUND),
            AppError::Unauthorized(_) => {
                ("authentication_error", error_codes::INVALID_CREDENTIALS)
            }
            AppError::Forbidden(_) => ("authorization_error", "AUTHORIZATION_ERROR"),
            AppError::Upstream(_) => ("upstream_error", error_codes::UPSTREAM_ERROR),
            AppError::Internal(_) => ("server_error", error_codes::INTERNAL_SERVER_ERROR),
            AppError::BadRequest(_) => ("validation_error", "INVALID_REQUEST"),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, code, "request failed");
        }

        let message = self.public_message();
        let response = ErrorResponse::new(
            match status {
                StatusCode::BAD_REQUEST => "Bad Request",
                StatusCode::UNAUTHORIZED => "Unauthorized",
                StatusCode::FORBIDDEN => "Forbidden",
                StatusCode::NOT_FOUND => "Not Found",
                StatusCode::CONFLICT => "Conflict",
                StatusCode::BAD_GATEWAY => "Bad Gateway",
                StatusCode::INTERNAL_SERVER_ERROR => "Internal Server Error",
                _ => "Error",
            },
            &message,
            status.as_u16(),
            error_type,
            code,
        );

        HttpResponse::build(status).json(response)
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Internal(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Internal(msg.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        AppError::StorageError(err.to_string())
    }
}

impl From<UploadError> for AppError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::Cancelled { .. } => AppError::UploadCancelled,
            other => AppError::UploadFailed(other.to_string()),
        }
    }
}
