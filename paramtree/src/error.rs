//! Error types for devices

use std::time::Duration;

use control_protocol::ControlError;
use param_map::MapError;
use query_protocol::QueryError;
use query_server::ServerError;

/// Errors raised by local and remote devices
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error(transparent)]
    Map(#[from] MapError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Control(#[from] ControlError),

    #[error(transparent)]
    Server(#[from] ServerError),

    /// The parameter's access mode forbids writing
    #[error("Access denied: {0} is not writable")]
    AccessDenied(String),

    /// No transport or peer address is available yet
    #[error("Not connected: {0}")]
    NotConnected(String),

    /// A namespace walk or request did not complete in time
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// A background thread or runtime could not start
    #[error("Worker startup failed: {0}")]
    WorkerStartup(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for Results using DeviceError.
pub type Result<T> = std::result::Result<T, DeviceError>;
