//! Port registry error types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use warden_config::ConfigError;
use warden_core::CoreError;
use warden_ipc::IpcError;
use warden_supervisor::SupervisorError;

pub type PortRegistryResult<T> = Result<T, PortRegistryError>;

#[derive(Error, Debug)]
pub enum PortRegistryError {
    #[error("Task name must not be empty")]
    InvalidTaskName,

    #[error("Port registry is not running")]
    NotRunning,

    /// The blocking allocation task did not complete
    #[error("Port allocation aborted: {0}")]
    Allocation(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Ipc(#[from] IpcError),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
}

impl IntoResponse for PortRegistryError {
    fn into_response(self) -> Response {
        let status = match self {
            PortRegistryError::InvalidTaskName => StatusCode::BAD_REQUEST,
            PortRegistryError::Core(CoreError::NoFreePort { .. }) => StatusCode::SERVICE_UNAVAILABLE,
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
