//! Inter-process control protocol for Warden
//!
//! Every worker exposes the same five operations over loopback HTTP. This
//! crate owns the operation table, the request shapes and the client that
//! supervisors use to reach a worker at the port named in its descriptor.

pub mod client;
pub mod error;
pub mod protocol;

// Re-export commonly used types
pub use client::ControlClient;
pub use error::{IpcError, IpcResult};
pub use protocol::{ControlOperation, ControlProtocol, InitializeMetadataRequest};
