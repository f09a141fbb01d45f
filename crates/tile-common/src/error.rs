//! Error types for the weather tile engine.

use thiserror::Error;

/// Result type alias using TileError.
pub type TileResult<T> = Result<T, TileError>;

/// Primary error type for tile generation and data refresh.
#[derive(Debug, Error)]
pub enum TileError {
    // === Request Errors ===
    #[error("Invalid value for '{param}': {message}")]
    Validation { param: String, message: String },

    #[error("Layer not found: {0}")]
    UnknownLayer(String),

    #[error("Data source not found: {0}")]
    UnknownSource(String),

    // === Data Errors ===
    #[error("Data source '{0}' has not loaded any data yet")]
    NotLoaded(String),

    #[error("Data not available: {0}")]
    DataNotAvailable(String),

    #[error("Failed to decode GRIB2 payload: {0}")]
    Decode(String),

    #[error("Network error: {0}")]
    Network(String),

    // === Storage Errors ===
    #[error("Cache error: {0}")]
    Cache(String),

    // === Rendering Errors ===
    #[error("Rendering failed: {0}")]
    Render(String),

    // === Infrastructure Errors ===
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Request timeout")]
    Timeout,
}

impl TileError {
    /// Shorthand for a validation failure on one request parameter.
    pub fn validation(param: impl Into<String>, message: impl Into<String>) -> Self {
        TileError::Validation {
            param: param.into(),
            message: message.into(),
        }
    }

    /// Whether a failed payload decode may succeed after re-fetching it.
    pub fn is_retryable_decode(&self) -> bool {
        matches!(self, TileError::Decode(_))
    }

    /// Get the HTTP status code for this error.
    pub fn http_status_code(&self) -> u16 {
        match self {
            TileError::Validation { .. } => 400,

            TileError::UnknownLayer(_)
            | TileError::UnknownSource(_)
            | TileError::DataNotAvailable(_) => 404,

            TileError::NotLoaded(_) | TileError::ServiceUnavailable(_) => 503,
            TileError::Timeout => 504,

            _ => 500,
        }
    }
}

// Conversion from common error types
impl From<std::io::Error> for TileError {
    fn from(err: std::io::Error) -> Self {
        TileError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for TileError {
    fn from(err: serde_json::Error) -> Self {
        TileError::Internal(format!("JSON error: {}", err))
    }
}
