//! Tilegate error types

use std::time::Duration;

/// Tilegate error types
#[derive(Debug, thiserror::Error)]
pub enum TilegateError {
    // Network errors
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("upstream returned {status} for {url}")]
    Status { status: u16, url: String },

    #[error("network timed out after {0:?}")]
    Timeout(Duration),

    // Storage errors
    #[error("storage error: {0}")]
    Storage(String),

    // Data errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The control channel task has shut down and can no longer reply.
    #[error("control channel closed")]
    ChannelClosed,
}

impl TilegateError {
    /// Whether this error came from the network side of a request.
    ///
    /// Strategies degrade to cached data on these; everything else is a
    /// programming or configuration problem and is surfaced as-is.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            TilegateError::Http(_) | TilegateError::Status { .. } | TilegateError::Timeout(_)
        )
    }
}

impl From<std::io::Error> for TilegateError {
    fn from(err: std::io::Error) -> Self {
        TilegateError::Storage(err.to_string())
    }
}

impl From<url::ParseError> for TilegateError {
    fn from(err: url::ParseError) -> Self {
        TilegateError::InvalidUrl(err.to_string())
    }
}

/// Result type alias for Tilegate operations
pub type Result<T> = std::result::Result<T, TilegateError>;
