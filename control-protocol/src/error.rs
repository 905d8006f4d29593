//! Error types for the control protocol

use param_map::MapError;

/// Errors raised while decoding, converting or dispatching OSC traffic
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    /// An argument could not be coerced to the destination value
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Incoming type tags do not match the stored parameter
    #[error("Type mismatch at {address}: expected {expected:?}, got {actual:?}")]
    TypeMismatch {
        address: String,
        expected: String,
        actual: String,
    },

    /// Minuit address with an empty or unparseable attribute suffix
    #[error("Malformed address: {0:?}")]
    MalformedAddress(String),

    /// Minuit action string that is not `<name><?|:|!><operation>`
    #[error("Malformed action: {0:?}")]
    MalformedAction(String),

    #[error("Unknown attribute: {0:?}")]
    UnknownAttribute(String),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<MapError> for ControlError {
    fn from(err: MapError) -> Self {
        match err {
            MapError::InvalidAddress(addr) => ControlError::MalformedAddress(addr),
            other => ControlError::InvalidInput(other.to_string()),
        }
    }
}

/// Convenience type alias for Results using ControlError.
pub type Result<T> = std::result::Result<T, ControlError>;
