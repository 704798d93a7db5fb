//! Error types for the core data model
use thiserror::Error;

/// Core configuration and data model errors
#[derive(Error, Debug)]
pub enum CoreError {
    /// A byte order was assigned to a buffer built for a different channel count
    #[error("Channel count mismatch: buffer holds {expected} channels per point, byte order has {actual}")]
    ChannelCountMismatch {
        /// Channels per point the buffer was allocated for
        expected: usize,
        /// Channels per point of the rejected byte order
        actual: usize,
    },

    /// Invalid parameter value
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Configuration failed validation
    #[error("Config error: {0}")]
    Config(String),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML deserialization error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
