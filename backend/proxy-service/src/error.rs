/// Error types for proxy-service
///
/// Clients only ever see `{"error": "<message>"}`; upstream detail stays in
/// the logs.
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("Invalid endpoint.")]
    InvalidEndpoint,

    #[error("Missing {0} parameter")]
    MissingParameter(&'static str),

    #[error("API key not configured")]
    NotConfigured,

    #[error("places API request failed: {0}")]
    Places(String),

    #[error("facts generation failed: {0}")]
    Facts(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ProxyError {
    /// Message returned to the caller
    pub fn public_message(&self) -> String {
        match self {
            ProxyError::Places(_) => "Error contacting places API".to_string(),
            ProxyError::Facts(_) => "Error generating facts".to_string(),
            other => other.to_string(),
        }
    }
}

impl ResponseError for ProxyError {
    fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::InvalidEndpoint | ProxyError::MissingParameter(_) => {
                StatusCode::BAD_REQUEST
            }
            ProxyError::NotConfigured | ProxyError::Facts(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::Places(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "proxy request failed");
        }
        HttpResponse::build(status).json(ErrorBody {
            error: self.public_message(),
        })
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;
