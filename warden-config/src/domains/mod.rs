//! Domain-specific configuration modules

pub mod logging;
pub mod ports;
pub mod supervisor;

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};

/// Main Warden configuration combining all domains
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct WardenConfig {
    /// Worker lifecycle and health probing
    #[serde(default)]
    pub supervisor: supervisor::SupervisorConfig,

    /// Port registry worker
    #[serde(default)]
    pub ports: ports::PortsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: logging::LoggingConfig,
}

impl WardenConfig {
    /// Validate all domain configurations
    pub fn validate_all(&self) -> ConfigResult<()> {
        self.supervisor.validate()?;
        self.ports.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// Render the configuration as YAML
    pub fn to_yaml(&self) -> ConfigResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}
