//! Supervisor configuration: where descriptors live and how long to wait

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigResult;
use crate::validation::{validate_positive, validate_required_string, Validatable};

/// Worker lifecycle configuration shared by every worker type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Namespace of the per-user state directory (`~/.<tool_namespace>`)
    pub tool_namespace: String,

    /// Explicit state directory, overriding the per-user default
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,

    /// Tick between descriptor polls and health-probe attempts
    pub poll_interval_ms: u64,

    /// Ticks to wait for a booting worker to finish starting
    pub boot_wait_attempts: u32,

    /// Health-probe attempts when attaching to an existing worker
    pub health_check_retries: u32,

    /// Health-probe attempts after spawning a detached worker
    pub detached_health_check_retries: u32,

    /// Health-probe attempts after a restart
    pub restart_health_check_retries: u32,

    /// A boot marker older than this is considered abandoned
    pub stale_start_after_secs: u64,

    /// Grace period between a kill request and the worker exiting
    pub kill_delay_ms: u64,

    /// Timeout for a single control request
    pub request_timeout_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            tool_namespace: "warden".to_string(),
            state_dir: None,
            poll_interval_ms: 1000,
            boot_wait_attempts: 15,
            health_check_retries: 1,
            detached_health_check_retries: 15,
            restart_health_check_retries: 20,
            stale_start_after_secs: 30,
            kill_delay_ms: 300,
            request_timeout_ms: 2000,
        }
    }
}

impl SupervisorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn stale_start_after(&self) -> Duration {
        Duration::from_secs(self.stale_start_after_secs)
    }

    pub fn kill_delay(&self) -> Duration {
        Duration::from_millis(self.kill_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Validatable for SupervisorConfig {
    fn validate(&self) -> ConfigResult<()> {
        let domain = self.domain_name();
        validate_required_string(&self.tool_namespace, "tool_namespace", domain)?;
        validate_positive(self.poll_interval_ms, "poll_interval_ms", domain)?;
        validate_positive(self.boot_wait_attempts, "boot_wait_attempts", domain)?;
        validate_positive(self.health_check_retries, "health_check_retries", domain)?;
        validate_positive(
            self.detached_health_check_retries,
            "detached_health_check_retries",
            domain,
        )?;
        validate_positive(
            self.restart_health_check_retries,
            "restart_health_check_retries",
            domain,
        )?;
        validate_positive(self.request_timeout_ms, "request_timeout_ms", domain)?;

        if self.tool_namespace.contains(std::path::MAIN_SEPARATOR) {
            return Err(self.validation_error("tool_namespace must not contain a path separator"));
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "supervisor"
    }
}
