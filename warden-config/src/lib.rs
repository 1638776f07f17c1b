//! Domain-driven configuration management for Warden
//!
//! Configuration is split by functional domain (supervisor, ports, logging),
//! loaded from an optional YAML file and overridden by `WARDEN_*` environment
//! variables.

pub mod error;
pub mod loader;
pub mod validation;

// Domain-specific configuration modules
pub mod domains;

// Re-export main types
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;

// Re-export domain configurations
pub use domains::{
    logging::LoggingConfig, ports::PortsConfig, supervisor::SupervisorConfig, WardenConfig,
};
