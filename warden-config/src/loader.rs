//! Configuration loading and environment variable handling

use crate::domains::logging::{LogFormat, LogLevel, LoggingConfig};
use crate::domains::ports::PortsConfig;
use crate::domains::supervisor::SupervisorConfig;
use crate::domains::WardenConfig;
use crate::error::{ConfigError, ConfigResult};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    /// Environment variable prefix
    prefix: String,
}

impl ConfigLoader {
    /// Create a new config loader with default prefix
    pub fn new() -> Self {
        Self {
            prefix: "WARDEN".to_string(),
        }
    }

    /// Create a new config loader with custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Load configuration from a YAML file with environment overrides
    pub fn from_file(&self, path: impl AsRef<Path>) -> ConfigResult<WardenConfig> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let mut config: WardenConfig = serde_yaml::from_str(&content)?;
        log::debug!("Loaded configuration from {:?}", path.as_ref());

        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env(&self) -> ConfigResult<WardenConfig> {
        let mut config = WardenConfig::default();
        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Load configuration with fallback chain
    pub fn load(&self, config_path: Option<impl AsRef<Path>>) -> ConfigResult<WardenConfig> {
        match config_path {
            Some(path) => self.from_file(path),
            None => self.from_env(),
        }
    }

    fn apply_env_overrides(&self, config: &mut WardenConfig) -> ConfigResult<()> {
        self.apply_supervisor_overrides(&mut config.supervisor)?;
        self.apply_ports_overrides(&mut config.ports)?;
        self.apply_logging_overrides(&mut config.logging)?;
        Ok(())
    }

    fn apply_supervisor_overrides(&self, config: &mut SupervisorConfig) -> ConfigResult<()> {
        if let Ok(namespace) = self.get_env_var("TOOL_NAMESPACE") {
            config.tool_namespace = namespace;
        }

        if let Ok(state_dir) = self.get_env_var("STATE_DIR") {
            config.state_dir = Some(PathBuf::from(state_dir));
        }

        if let Some(interval) = self.parse_env_var("POLL_INTERVAL_MS")? {
            config.poll_interval_ms = interval;
        }

        if let Some(attempts) = self.parse_env_var("BOOT_WAIT_ATTEMPTS")? {
            config.boot_wait_attempts = attempts;
        }

        if let Some(retries) = self.parse_env_var("HEALTH_CHECK_RETRIES")? {
            config.health_check_retries = retries;
        }

        if let Some(retries) = self.parse_env_var("DETACHED_HEALTH_CHECK_RETRIES")? {
            config.detached_health_check_retries = retries;
        }

        if let Some(retries) = self.parse_env_var("RESTART_HEALTH_CHECK_RETRIES")? {
            config.restart_health_check_retries = retries;
        }

        if let Some(secs) = self.parse_env_var("STALE_START_AFTER_SECS")? {
            config.stale_start_after_secs = secs;
        }

        if let Some(delay) = self.parse_env_var("KILL_DELAY_MS")? {
            config.kill_delay_ms = delay;
        }

        if let Some(timeout) = self.parse_env_var("REQUEST_TIMEOUT_MS")? {
            config.request_timeout_ms = timeout;
        }

        Ok(())
    }

    fn apply_ports_overrides(&self, config: &mut PortsConfig) -> ConfigResult<()> {
        if let Some(base) = self.parse_env_var("WORKER_PORT_BASE")? {
            config.worker_port_base = base;
        }

        if let Some(base) = self.parse_env_var("ASSIGNMENT_PORT_BASE")? {
            config.assignment_port_base = base;
        }

        Ok(())
    }

    fn apply_logging_overrides(&self, config: &mut LoggingConfig) -> ConfigResult<()> {
        if let Ok(log_level) = self.get_env_var("LOG_LEVEL") {
            config.level = LogLevel::from_str(&log_level)
                .map_err(|_| ConfigError::EnvError(format!("Invalid LOG_LEVEL: {}", log_level)))?;
        }

        if let Ok(format) = self.get_env_var("LOG_FORMAT") {
            config.format = LogFormat::from_str(&format)
                .map_err(|_| ConfigError::EnvError(format!("Invalid LOG_FORMAT: {}", format)))?;
        }

        if let Ok(file) = self.get_env_var("LOG_FILE") {
            config.file = Some(PathBuf::from(file));
        }

        Ok(())
    }

    fn parse_env_var<T>(&self, name: &str) -> ConfigResult<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get_env_var(name) {
            Ok(raw) => raw
                .parse()
                .map(Some)
                .map_err(|e| ConfigError::EnvError(format!("Invalid {}_{}: {}", self.prefix, name, e))),
            Err(_) => Ok(None),
        }
    }

    /// Get environment variable with prefix
    fn get_env_var(&self, name: &str) -> Result<String, std::env::VarError> {
        std::env::var(format!("{}_{}", self.prefix, name))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
