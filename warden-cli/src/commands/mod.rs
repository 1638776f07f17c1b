//! Subcommand implementations

pub mod assign;
pub mod info;
pub mod port_registry;

use anyhow::{bail, Context as _, Result};
use std::path::PathBuf;
use std::sync::Arc;
use warden_config::WardenConfig;
use warden_ports::PortRegistry;
use warden_runtime::WorkerProcessRuntime;
use warden_supervisor::{ProcessLauncher, SupervisorOptions, WorkerSupervisor};

/// Version every worker started by this binary reports
pub const WORKER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Settings shared by every command of one invocation
pub struct Context {
    pub config: WardenConfig,
    pub config_path: Option<PathBuf>,
    pub log_level: Option<String>,
}

impl Context {
    pub fn new(config: WardenConfig, config_path: Option<PathBuf>, log_level: Option<String>) -> Self {
        Self {
            config,
            config_path,
            log_level,
        }
    }

    pub fn supervisor_options(&self, service_id: &str) -> Result<SupervisorOptions> {
        SupervisorOptions::from_config(&self.config, service_id, WORKER_VERSION)
            .with_context(|| format!("Failed to resolve settings for {}", service_id))
    }

    /// Supervisor that launches workers by re-executing this binary
    pub fn supervisor(&self, service_id: &str) -> Result<WorkerSupervisor> {
        let launcher = ProcessLauncher::current_exe()?.with_args(self.forwarded_args());
        Ok(WorkerSupervisor::new(
            self.supervisor_options(service_id)?,
            Arc::new(launcher),
        )?)
    }

    pub fn registry_supervisor(&self) -> Result<WorkerSupervisor> {
        self.supervisor(&self.config.ports.service_id)
    }

    /// Domain runtime of a worker service
    pub fn runtime(&self, service_id: &str) -> Result<Arc<dyn WorkerProcessRuntime>> {
        if service_id == self.config.ports.service_id {
            return Ok(Arc::new(PortRegistry::from_config(&self.config.ports)?));
        }
        bail!("Unknown worker service '{}'", service_id)
    }

    /// Global flags a detached worker inherits
    fn forwarded_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(ref path) = self.config_path {
            let path = std::fs::canonicalize(path).unwrap_or_else(|_| path.clone());
            args.push("--config".to_string());
            args.push(path.display().to_string());
        }
        if let Some(ref level) = self.log_level {
            args.push("--log-level".to_string());
            args.push(level.clone());
        }
        args
    }
}
