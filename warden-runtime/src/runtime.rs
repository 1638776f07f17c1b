//! The per-worker-type extension point

use axum::Router;
use std::sync::Arc;
use warden_core::WorkerDescriptor;

/// Behaviour a concrete worker type plugs into the host.
///
/// The control protocol is served for every worker; a worker type only adds
/// its domain routes and a few lines of status.
pub trait WorkerProcessRuntime: Send + Sync + 'static {
    /// Service id this worker registers under
    fn service_id(&self) -> &str;

    /// Domain routes served next to the control routes
    fn domain_routes(self: Arc<Self>) -> Router {
        Router::new()
    }

    /// Extra status lines appended to `info`
    fn describe(&self) -> Vec<String> {
        Vec::new()
    }
}

/// In-memory identity of a running worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerIdentity {
    pub service_id: String,
    pub version: String,
    pub port: u16,
    pub pid: u32,
}

impl WorkerIdentity {
    /// Identity as it should appear in the descriptor once started
    pub fn descriptor(&self) -> WorkerDescriptor {
        WorkerDescriptor::started(&self.service_id, self.port, self.pid, &self.version)
    }
}
