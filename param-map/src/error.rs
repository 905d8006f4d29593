//! Error types for the parameter map

/// Errors raised by the parameter model and map
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MapError {
    /// The address is not a well-formed slash-separated path
    #[error("Invalid address: {0:?}")]
    InvalidAddress(String),

    /// No parameter is stored at the address
    #[error("Path not found: {0}")]
    PathNotFound(String),

    /// A value could not be interpreted as requested
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Parallel facet sequences disagree in length
    #[error("Facet length mismatch at {destination}: {values} values, {ranges} ranges, {clipmodes} clip modes")]
    LengthMismatch {
        /// Address of the offending parameter
        destination: String,
        /// Number of values
        values: usize,
        /// Number of ranges
        ranges: usize,
        /// Number of clip modes
        clipmodes: usize,
    },
}

/// Convenience type alias for Results using MapError.
pub type Result<T> = std::result::Result<T, MapError>;
