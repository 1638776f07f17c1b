//! Core error types

use thiserror::Error;

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised by descriptor persistence and port probing
#[derive(Error, Debug)]
pub enum CoreError {
    /// IO error touching the descriptor file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Descriptor could not be serialized
    #[error("Failed to serialize descriptor: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No home directory to anchor the per-user state directory
    #[error("Unable to resolve the home directory for the worker state directory")]
    HomeDirUnavailable,

    /// The port scan ran off the end of the port range
    #[error("No free port available starting from {start_from}")]
    NoFreePort { start_from: u16 },
}
