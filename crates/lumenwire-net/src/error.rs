//! Error types for the output system
use lumenwire_core::CoreError;
use thiserror::Error;

use crate::protocol::ProtocolKind;

/// Output system errors
#[derive(Error, Debug)]
pub enum OutputError {
    /// A hostname could not be resolved; the affected packet is disabled
    #[error("Failed to resolve {host}: {reason}")]
    Resolve {
        /// Host as configured
        host: String,
        /// Resolver message
        reason: String,
    },

    /// Socket I/O error on a single send
    #[error("Send error: {0}")]
    Send(#[from] std::io::Error),

    /// Configuration error from the core model
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A packet of the wrong protocol was added to a chunked output
    #[error("Protocol mismatch: output carries {expected} packets, got {actual}")]
    ProtocolMismatch {
        /// Protocol the output was built for
        expected: ProtocolKind,
        /// Protocol of the rejected packet
        actual: ProtocolKind,
    },

    /// Invalid parameter value
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Result type for output operations
pub type Result<T> = std::result::Result<T, OutputError>;
