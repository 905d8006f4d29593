//! Error types for the query protocol

use param_map::MapError;

/// Errors raised while parsing requests or decoding documents
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// Malformed request line
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The addressed node does not exist
    #[error("Path not found: {0}")]
    PathNotFound(String),

    /// A document field has the wrong shape or type
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The text is not JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QueryError {
    /// Errors caused by the requester rather than the device
    ///
    /// Transports report these as "bad request" replies.
    pub fn is_client_error(&self) -> bool {
        matches!(self, QueryError::BadRequest(_) | QueryError::PathNotFound(_))
    }
}

impl From<MapError> for QueryError {
    fn from(err: MapError) -> Self {
        match err {
            MapError::InvalidAddress(addr) => QueryError::BadRequest(format!("invalid address {addr:?}")),
            MapError::PathNotFound(path) => QueryError::PathNotFound(path),
            other => QueryError::InvalidInput(other.to_string()),
        }
    }
}

/// Convenience type alias for Results using QueryError.
pub type Result<T> = std::result::Result<T, QueryError>;
