//! IPC error types

use thiserror::Error;

pub type IpcResult<T> = Result<T, IpcError>;

/// IPC error types
#[derive(Debug, Clone, Error)]
pub enum IpcError {
    /// Nothing is listening, or the connection dropped
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Timeout waiting for response
    #[error("Timeout waiting for response")]
    Timeout,

    /// The worker answered with a non-success status
    #[error("{operation} returned HTTP {status}")]
    Status { operation: &'static str, status: u16 },

    /// Body could not be decoded
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Request could not be built or sent
    #[error("Request error: {0}")]
    Request(String),

    /// The worker failed while handling the operation
    #[error("Worker error: {0}")]
    Worker(String),
}

impl IpcError {
    /// Transient network failures: the worker may simply not be up yet
    pub fn is_retryable(&self) -> bool {
        matches!(self, IpcError::Connection(_) | IpcError::Timeout)
    }
}

impl From<reqwest::Error> for IpcError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            IpcError::Timeout
        } else if err.is_connect() {
            IpcError::Connection(err.to_string())
        } else if err.is_decode() || err.is_body() {
            IpcError::InvalidResponse(err.to_string())
        } else if let Some(status) = err.status() {
            IpcError::Status {
                operation: "request",
                status: status.as_u16(),
            }
        } else if err.is_request() {
            // Resets mid-request surface here rather than as connect errors
            IpcError::Connection(err.to_string())
        } else {
            IpcError::Request(err.to_string())
        }
    }
}

impl From<serde_json::Error> for IpcError {
    fn from(err: serde_json::Error) -> Self {
        IpcError::InvalidResponse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        assert!(IpcError::Connection("refused".to_string()).is_retryable());
        assert!(IpcError::Timeout.is_retryable());
        assert!(!IpcError::Status {
            operation: "isHealthy",
            status: 500
        }
        .is_retryable());
        assert!(!IpcError::InvalidResponse("bad".to_string()).is_retryable());
        assert!(!IpcError::Worker("disk full".to_string()).is_retryable());
    }

    #[test]
    fn test_status_message_names_operation() {
        let err = IpcError::Status {
            operation: "hasUpToDateVersion",
            status: 404,
        };
        assert_eq!(err.to_string(), "hasUpToDateVersion returned HTTP 404");
    }
}
