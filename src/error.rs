use crate::protocol::{McpErrorCode, McpErrorResponse};

/// Failures talking to the threat intelligence API.
#[derive(Debug, thiserror::Error)]
pub enum GtiError {
    #[error("VT_APIKEY environment variable is required")]
    MissingApiKey,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Error object returned by the API (`{"error": {"code", "message"}}`).
    #[error("{code}: {message}")]
    Api { code: String, message: String },

    #[error("{0}")]
    NotFound(String),

    #[error("Expected object of type {expected}, got {actual}")]
    UnexpectedType { expected: String, actual: String },

    #[error("Malformed API response: {0}")]
    Malformed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GtiError>;

impl From<GtiError> for McpErrorResponse {
    fn from(err: GtiError) -> Self {
        let code = match &err {
            GtiError::MissingApiKey => McpErrorCode::MissingApiKey,
            GtiError::NotFound(_) => McpErrorCode::NotFound,
            GtiError::Io(_) => McpErrorCode::IoError,
            GtiError::Http(_) | GtiError::Api { .. } => McpErrorCode::ApiError,
            GtiError::UnexpectedType { .. } | GtiError::Malformed(_) => McpErrorCode::ApiError,
        };
        McpErrorResponse::new(code, err.to_string())
    }
}
