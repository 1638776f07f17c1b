//! Supervisor settings

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use warden_config::WardenConfig;
use warden_core::{WorkerDescriptorStore, DEFAULT_WORKER_PORT_BASE};
use warden_runtime::HostOptions;

use crate::error::SupervisorResult;

/// Everything a supervisor needs to know about one service
#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    pub service_id: String,
    /// Version of the worker this invocation would start
    pub version: String,
    pub state_dir: PathBuf,
    pub bind_host: IpAddr,
    pub worker_port_base: u16,
    pub poll_interval: Duration,
    pub boot_wait_attempts: u32,
    pub health_check_retries: u32,
    pub detached_health_check_retries: u32,
    pub restart_health_check_retries: u32,
    pub stale_start_after: Duration,
    pub kill_delay: Duration,
    pub request_timeout: Duration,
}

impl SupervisorOptions {
    /// Defaults matching the stock configuration
    pub fn new(
        service_id: impl Into<String>,
        version: impl Into<String>,
        state_dir: impl AsRef<Path>,
    ) -> Self {
        let defaults = WardenConfig::default();
        let supervisor = &defaults.supervisor;

        Self {
            service_id: service_id.into(),
            version: version.into(),
            state_dir: state_dir.as_ref().to_path_buf(),
            bind_host: IpAddr::from([127, 0, 0, 1]),
            worker_port_base: DEFAULT_WORKER_PORT_BASE,
            poll_interval: supervisor.poll_interval(),
            boot_wait_attempts: supervisor.boot_wait_attempts,
            health_check_retries: supervisor.health_check_retries,
            detached_health_check_retries: supervisor.detached_health_check_retries,
            restart_health_check_retries: supervisor.restart_health_check_retries,
            stale_start_after: supervisor.stale_start_after(),
            kill_delay: supervisor.kill_delay(),
            request_timeout: supervisor.request_timeout(),
        }
    }

    /// Options from loaded configuration; the state directory falls back to
    /// `<home>/.<tool_namespace>`
    pub fn from_config(
        config: &WardenConfig,
        service_id: impl Into<String>,
        version: impl Into<String>,
    ) -> SupervisorResult<Self> {
        let supervisor = &config.supervisor;
        let state_dir = match supervisor.state_dir {
            Some(ref dir) => dir.clone(),
            None => WorkerDescriptorStore::user_state_dir(&supervisor.tool_namespace)?,
        };
        let bind_host = config
            .ports
            .bind_addr()
            .unwrap_or_else(|_| IpAddr::from([127, 0, 0, 1]));

        Ok(Self {
            service_id: service_id.into(),
            version: version.into(),
            state_dir,
            bind_host,
            worker_port_base: config.ports.worker_port_base,
            poll_interval: supervisor.poll_interval(),
            boot_wait_attempts: supervisor.boot_wait_attempts,
            health_check_retries: supervisor.health_check_retries,
            detached_health_check_retries: supervisor.detached_health_check_retries,
            restart_health_check_retries: supervisor.restart_health_check_retries,
            stale_start_after: supervisor.stale_start_after(),
            kill_delay: supervisor.kill_delay(),
            request_timeout: supervisor.request_timeout(),
        })
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_worker_port_base(mut self, port_base: u16) -> Self {
        self.worker_port_base = port_base;
        self
    }

    pub fn with_kill_delay(mut self, kill_delay: Duration) -> Self {
        self.kill_delay = kill_delay;
        self
    }

    pub fn with_stale_start_after(mut self, stale_start_after: Duration) -> Self {
        self.stale_start_after = stale_start_after;
        self
    }

    pub fn descriptor_store(&self) -> WorkerDescriptorStore {
        WorkerDescriptorStore::new(&self.state_dir, self.service_id.clone())
    }

    /// Host settings for a worker of this service running in this process
    pub fn host_options(&self) -> HostOptions {
        HostOptions::new(self.version.clone())
            .with_bind_host(self.bind_host)
            .with_port_base(self.worker_port_base)
            .with_kill_delay(self.kill_delay)
    }
}
