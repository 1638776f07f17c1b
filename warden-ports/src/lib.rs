//! Port registry worker
//!
//! Every other service asks this worker for a port instead of scanning the OS
//! itself, so assignment is serialized through one process and two services
//! never race for the same free port.

pub mod client;
pub mod error;
pub mod registry;

pub use client::{assign_port, PortRegistryClient};
pub use error::{PortRegistryError, PortRegistryResult};
pub use registry::{
    PortRegistry, RegisterPortRequest, RegisterPortResponse, ASSIGNMENTS_PATH, REGISTER_PATH,
};
