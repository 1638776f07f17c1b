//! Control operations every worker exposes

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use warden_core::WorkerDescriptor;

use crate::error::IpcResult;

/// The fixed set of control operations.
///
/// Workers register exactly these routes at startup; the client dials the
/// same paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlOperation {
    InitializeMetadata,
    Kill,
    Info,
    IsHealthy,
    HasUpToDateVersion,
}

impl ControlOperation {
    pub const ALL: [ControlOperation; 5] = [
        ControlOperation::InitializeMetadata,
        ControlOperation::Kill,
        ControlOperation::Info,
        ControlOperation::IsHealthy,
        ControlOperation::HasUpToDateVersion,
    ];

    /// Operation name as used in logs and errors
    pub fn name(self) -> &'static str {
        match self {
            ControlOperation::InitializeMetadata => "initializeMetadata",
            ControlOperation::Kill => "kill",
            ControlOperation::Info => "info",
            ControlOperation::IsHealthy => "isHealthy",
            ControlOperation::HasUpToDateVersion => "hasUpToDateVersion",
        }
    }

    /// HTTP path. `info` is global so a browser can open it directly.
    pub fn path(self) -> &'static str {
        match self {
            ControlOperation::InitializeMetadata => "/control/initialize-metadata",
            ControlOperation::Kill => "/control/kill",
            ControlOperation::Info => "/info",
            ControlOperation::IsHealthy => "/control/is-healthy",
            ControlOperation::HasUpToDateVersion => "/control/has-up-to-date-version",
        }
    }

    /// Only `info` is served over GET; everything else is POST
    pub fn is_get(self) -> bool {
        matches!(self, ControlOperation::Info)
    }
}

/// Body of `initializeMetadata`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeMetadataRequest {
    pub service_id: String,
    pub service_version: String,
}

impl InitializeMetadataRequest {
    pub fn new(service_id: impl Into<String>, service_version: impl Into<String>) -> Self {
        Self {
            service_id: service_id.into(),
            service_version: service_version.into(),
        }
    }
}

/// Remote control surface of a worker.
///
/// Implemented by the worker itself and by [`crate::ControlClient`], so the
/// supervisor and in-process tests talk to either through one interface.
#[async_trait]
pub trait ControlProtocol: Send + Sync {
    /// Set the worker's identity. Idempotent.
    async fn initialize_metadata(&self, request: InitializeMetadataRequest) -> IpcResult<()>;

    /// Schedule process termination after a short grace delay
    async fn kill(&self) -> IpcResult<()>;

    /// Human-readable status
    async fn info(&self) -> IpcResult<String>;

    /// True iff the candidate's `{serviceID, port, pid}` is this worker's identity
    async fn is_healthy(&self, candidate: &WorkerDescriptor) -> IpcResult<bool>;

    /// True iff this worker's version is at least the candidate's
    async fn has_up_to_date_version(&self, candidate: &WorkerDescriptor) -> IpcResult<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_operation_paths_are_unique() {
        let paths: HashSet<_> = ControlOperation::ALL.iter().map(|op| op.path()).collect();
        assert_eq!(paths.len(), ControlOperation::ALL.len());
    }

    #[test]
    fn test_info_is_the_only_global_get() {
        for op in ControlOperation::ALL {
            assert_eq!(op.is_get(), op == ControlOperation::Info);
            assert_eq!(op.path().starts_with("/control/"), op != ControlOperation::Info);
        }
    }

    #[test]
    fn test_initialize_metadata_wire_shape() {
        let request = InitializeMetadataRequest::new("port-registry", "1.0.0");
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["serviceId"], "port-registry");
        assert_eq!(json["serviceVersion"], "1.0.0");
    }
}
