//! Port registry configuration

use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::error::ConfigResult;
use crate::validation::{validate_positive, validate_required_string, Validatable};

/// Port registry worker configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PortsConfig {
    /// Service id the registry worker registers under
    pub service_id: String,

    /// Loopback address workers bind and clients dial
    pub bind_host: String,

    /// First port a worker tries for its own control listener
    pub worker_port_base: u16,

    /// First port the registry hands out to tasks
    pub assignment_port_base: u16,
}

impl Default for PortsConfig {
    fn default() -> Self {
        Self {
            service_id: "port-registry".to_string(),
            bind_host: "127.0.0.1".to_string(),
            worker_port_base: 3600,
            assignment_port_base: 4000,
        }
    }
}

impl PortsConfig {
    /// Parsed bind host
    pub fn bind_addr(&self) -> ConfigResult<IpAddr> {
        self.bind_host
            .parse()
            .map_err(|e| self.validation_error(format!("Invalid bind_host '{}': {}", self.bind_host, e)))
    }
}

impl Validatable for PortsConfig {
    fn validate(&self) -> ConfigResult<()> {
        let domain = self.domain_name();
        validate_required_string(&self.service_id, "service_id", domain)?;
        validate_required_string(&self.bind_host, "bind_host", domain)?;
        validate_positive(self.worker_port_base, "worker_port_base", domain)?;
        validate_positive(self.assignment_port_base, "assignment_port_base", domain)?;
        self.bind_addr()?;
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "ports"
    }
}
