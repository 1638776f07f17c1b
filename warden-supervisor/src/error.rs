//! Supervisor error types

use thiserror::Error;
use warden_core::CoreError;
use warden_ipc::IpcError;
use warden_runtime::RuntimeError;

pub type SupervisorResult<T> = Result<T, SupervisorError>;

#[derive(Error, Debug)]
pub enum SupervisorError {
    /// The post-start health probe ran out of attempts
    #[error("Failed to start service '{service_id}': worker not healthy after {attempts} health checks")]
    StartFailed { service_id: String, attempts: u32 },

    /// The worker process could not be spawned
    #[error("Failed to launch worker for '{service_id}': {message}")]
    Launch { service_id: String, message: String },

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Ipc(#[from] IpcError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl SupervisorError {
    /// Process exit code for this failure
    pub fn exit_code(&self) -> i32 {
        1
    }
}
