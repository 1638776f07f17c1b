//! Runtime error types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::net::SocketAddr;
use thiserror::Error;
use warden_core::CoreError;
use warden_ipc::IpcError;

pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Errors raised while hosting a worker
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Descriptor persistence or port probing failed
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Another process owns the reserved port
    #[error("Failed to bind worker listener on {address}: {source}")]
    Bind {
        address: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// A kill or a tamper detection gave the descriptor up
    #[error("Worker has released its descriptor and is shutting down")]
    Released,

    #[error("Descriptor watcher error: {0}")]
    Watcher(#[from] notify::Error),

    #[error("Server error: {0}")]
    Server(#[source] std::io::Error),

    #[error("Interactive prompt failed: {0}")]
    Prompt(String),

    #[error("Failed to open {url}: {source}")]
    Browser {
        url: String,
        #[source]
        source: std::io::Error,
    },
}

impl IntoResponse for RuntimeError {
    fn into_response(self) -> Response {
        let status = match self {
            RuntimeError::Released => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = json!({
            "error": {
                "message": self.to_string(),
                "status": status.as_u16()
            }
        });
        (status, Json(body)).into_response()
    }
}

impl From<RuntimeError> for IpcError {
    fn from(err: RuntimeError) -> Self {
        IpcError::Worker(err.to_string())
    }
}
