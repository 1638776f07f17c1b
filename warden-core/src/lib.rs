//! Core types for Warden
//!
//! This crate holds the pieces every other Warden crate agrees on: the
//! persisted worker descriptor, the per-service descriptor store that acts as
//! the rendezvous point between CLI invocations and a background worker, and
//! the OS-level free-port probe.

pub mod assignment;
pub mod descriptor;
pub mod error;
pub mod ports;
pub mod store;

// Re-export main types
pub use assignment::TaskPortAssignment;
pub use descriptor::{DescriptorPatch, WorkerDescriptor};
pub use error::{CoreError, CoreResult};
pub use ports::{find_free_port, find_free_port_excluding, is_port_free, DEFAULT_WORKER_PORT_BASE};
pub use store::{WorkerDescriptorStore, DESCRIPTOR_DIR_NAME};
