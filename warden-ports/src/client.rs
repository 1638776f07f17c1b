//! Caller side of the port registry

use warden_core::TaskPortAssignment;
use warden_ipc::{ControlClient, IpcResult};
use warden_supervisor::WorkerSupervisor;
use tracing::debug;

use crate::error::{PortRegistryError, PortRegistryResult};
use crate::registry::{RegisterPortRequest, RegisterPortResponse, ASSIGNMENTS_PATH, REGISTER_PATH};

/// Domain calls against a running port registry worker
#[derive(Debug, Clone)]
pub struct PortRegistryClient {
    control: ControlClient,
}

impl PortRegistryClient {
    pub fn new(control: ControlClient) -> Self {
        Self { control }
    }

    /// Client for the worker the supervisor currently has recorded
    pub fn connect(supervisor: &WorkerSupervisor) -> PortRegistryResult<Self> {
        supervisor
            .connection()
            .map(Self::new)
            .ok_or(PortRegistryError::NotRunning)
    }

    pub fn control(&self) -> &ControlClient {
        &self.control
    }

    pub async fn register_and_assign_port(
        &self,
        task_name: &str,
        start_from: Option<u16>,
    ) -> IpcResult<u16> {
        let request = RegisterPortRequest {
            unique_service_name: task_name.to_string(),
            start_from,
        };
        let response: RegisterPortResponse = self
            .control
            .post_json("registerAndAssignPort", REGISTER_PATH, &request)
            .await?;
        Ok(response.port)
    }

    pub async fn assignments(&self) -> IpcResult<Vec<TaskPortAssignment>> {
        self.control.get_json("assignments", ASSIGNMENTS_PATH).await
    }
}

/// Ensure the registry is running, then ask it for `task_name`'s port
pub async fn assign_port(
    supervisor: &WorkerSupervisor,
    task_name: &str,
    start_from: Option<u16>,
) -> PortRegistryResult<u16> {
    if task_name.trim().is_empty() {
        return Err(PortRegistryError::InvalidTaskName);
    }

    let outcome = supervisor.start_detached_if_needs_to_be_started().await?;
    debug!("Port registry ready: {}", outcome.descriptor());

    let client = PortRegistryClient::connect(supervisor)?;
    Ok(client
        .register_and_assign_port(task_name.trim(), start_from)
        .await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::PortRegistry;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;
    use warden_runtime::WorkerProcessRuntime;
    use warden_supervisor::testing::InProcessLauncher;
    use warden_supervisor::SupervisorOptions;

    fn setup(port_base: u16) -> (TempDir, Arc<InProcessLauncher>, WorkerSupervisor) {
        let temp_dir = tempfile::tempdir().unwrap();
        let options = SupervisorOptions::new("port-registry", "1.0.0", temp_dir.path())
            .with_poll_interval(Duration::from_millis(50))
            .with_worker_port_base(port_base)
            .with_kill_delay(Duration::from_millis(20));
        let assignment_base = port_base + 500;
        let launcher = Arc::new(InProcessLauncher::new(
            move || {
                Arc::new(PortRegistry::new(
                    "port-registry",
                    IpAddr::V4(Ipv4Addr::LOCALHOST),
                    assignment_base,
                )) as Arc<dyn WorkerProcessRuntime>
            },
            &options,
        ));
        let supervisor = WorkerSupervisor::new(options, launcher.clone()).unwrap();
        (temp_dir, launcher, supervisor)
    }

    #[tokio::test]
    async fn test_assign_port_starts_registry_once() {
        let (_dir, launcher, supervisor) = setup(27000);

        let web = assign_port(&supervisor, "web", None).await.unwrap();
        let web_again = assign_port(&supervisor, "web", None).await.unwrap();
        let api = assign_port(&supervisor, "api", None).await.unwrap();

        assert_eq!(web, web_again);
        assert_ne!(web, api);
        assert!(web >= 27500);
        assert_eq!(launcher.launch_count(), 1);
    }

    #[tokio::test]
    async fn test_assignments_listed_over_http() {
        let (_dir, _launcher, supervisor) = setup(27100);
        let port = assign_port(&supervisor, "db", Some(27900)).await.unwrap();

        let client = PortRegistryClient::connect(&supervisor).unwrap();
        let assignments = client.assignments().await.unwrap();
        assert_eq!(assignments, vec![TaskPortAssignment::new("db", port)]);
    }

    #[tokio::test]
    async fn test_empty_task_name_rejected_before_start() {
        let (_dir, launcher, supervisor) = setup(27200);
        assert!(matches!(
            assign_port(&supervisor, "", None).await,
            Err(PortRegistryError::InvalidTaskName)
        ));
        assert_eq!(launcher.launch_count(), 0);
    }

    #[tokio::test]
    async fn test_registry_rejects_empty_name_with_bad_request() {
        let (_dir, _launcher, supervisor) = setup(27300);
        supervisor.start_detached_if_needs_to_be_started().await.unwrap();

        let client = PortRegistryClient::connect(&supervisor).unwrap();
        let err = client.register_and_assign_port(" ", None).await.unwrap_err();
        assert!(matches!(err, warden_ipc::IpcError::Status { status: 400, .. }));
    }

    #[test]
    fn test_connect_without_descriptor() {
        let (_dir, _launcher, supervisor) = setup(27400);
        assert!(matches!(
            PortRegistryClient::connect(&supervisor),
            Err(PortRegistryError::NotRunning)
        ));
    }
}
