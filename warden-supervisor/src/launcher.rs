//! How worker processes are brought up

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{SupervisorError, SupervisorResult};

/// A worker that has been launched but not yet confirmed healthy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchedWorker {
    pub pid: u32,
}

/// Brings a worker for a service into existence
#[async_trait]
pub trait WorkerLauncher: Send + Sync {
    async fn launch(&self, service_id: &str) -> SupervisorResult<LaunchedWorker>;
}

/// Spawns a detached copy of a program in worker mode.
///
/// The child runs in its own process group with null stdio so it outlives
/// the invocation that started it.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    args: Vec<OsString>,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Re-execute the running binary
    pub fn current_exe() -> SupervisorResult<Self> {
        let program = std::env::current_exe().map_err(|e| SupervisorError::Launch {
            service_id: String::new(),
            message: format!("Failed to get current exe: {}", e),
        })?;
        Ok(Self::new(program))
    }

    /// Arguments passed before the worker-mode flags
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn command(&self, service_id: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg("--worker")
            .arg("--worker-service")
            .arg(service_id)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        #[cfg(unix)]
        cmd.process_group(0);

        cmd
    }
}

#[async_trait]
impl WorkerLauncher for ProcessLauncher {
    async fn launch(&self, service_id: &str) -> SupervisorResult<LaunchedWorker> {
        debug!("Spawning worker process for {}", service_id);

        let child = self
            .command(service_id)
            .spawn()
            .map_err(|e| SupervisorError::Launch {
                service_id: service_id.to_string(),
                message: format!("Failed to spawn worker: {}", e),
            })?;

        let pid = child.id().ok_or_else(|| SupervisorError::Launch {
            service_id: service_id.to_string(),
            message: "worker exited immediately".to_string(),
        })?;

        info!("Launched worker for {} with pid {}", service_id, pid);
        Ok(LaunchedWorker { pid })
    }
}
