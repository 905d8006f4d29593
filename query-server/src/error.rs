//! Error types for the query server

use crate::router::ClientId;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Every port in the configured range is taken
    #[error("No available port found in range {0}-{1}")]
    NoAvailablePort(u16, u16),

    #[error("Server failed to start: {0}")]
    StartupFailed(String),

    /// The connection is not (or no longer) registered
    #[error("Unknown client: {0}")]
    UnknownClient(ClientId),
}

/// Convenience type alias for Results using ServerError.
pub type Result<T> = std::result::Result<T, ServerError>;
