//! Registry state and its HTTP routes

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::info;
use warden_config::PortsConfig;
use warden_core::{find_free_port_excluding, TaskPortAssignment};
use warden_runtime::WorkerProcessRuntime;

use crate::error::{PortRegistryError, PortRegistryResult};

pub const REGISTER_PATH: &str = "/ports/register-and-assign";
pub const ASSIGNMENTS_PATH: &str = "/ports/assignments";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPortRequest {
    pub unique_service_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_from: Option<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterPortResponse {
    pub port: u16,
}

/// Hands out one port per task name and remembers it for the worker's lifetime
pub struct PortRegistry {
    service_id: String,
    bind_host: IpAddr,
    assignment_base: u16,
    assignments: Mutex<HashMap<String, TaskPortAssignment>>,
}

impl PortRegistry {
    pub fn new(service_id: impl Into<String>, bind_host: IpAddr, assignment_base: u16) -> Self {
        Self {
            service_id: service_id.into(),
            bind_host,
            assignment_base,
            assignments: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &PortsConfig) -> PortRegistryResult<Self> {
        Ok(Self::new(
            config.service_id.clone(),
            config.bind_addr()?,
            config.assignment_port_base,
        ))
    }

    /// Port for `task_name`, allocating one on first request.
    ///
    /// The scan starts at `start_from` (or the registry's base) and skips
    /// ports already handed out, even ones their task has not bound yet.
    pub fn register_and_assign_port(
        &self,
        task_name: &str,
        start_from: Option<u16>,
    ) -> PortRegistryResult<TaskPortAssignment> {
        let task_name = task_name.trim();
        if task_name.is_empty() {
            return Err(PortRegistryError::InvalidTaskName);
        }

        // Check and allocate under one lock so two requests cannot split a task
        let mut assignments = self.assignments.lock();
        if let Some(existing) = assignments.get(task_name) {
            return Ok(existing.clone());
        }

        let taken: HashSet<u16> = assignments.values().map(|a| a.port).collect();
        let start = start_from.unwrap_or(self.assignment_base);
        let port = find_free_port_excluding(self.bind_host, start, &taken)?;

        let assignment = TaskPortAssignment::new(task_name, port);
        assignments.insert(task_name.to_string(), assignment.clone());
        info!("Assigned port {} to {}", port, task_name);

        Ok(assignment)
    }

    /// All assignments, ordered by task name
    pub fn assignments(&self) -> Vec<TaskPortAssignment> {
        let mut all: Vec<_> = self.assignments.lock().values().cloned().collect();
        all.sort_by(|a, b| a.task_name.cmp(&b.task_name));
        all
    }
}

impl WorkerProcessRuntime for PortRegistry {
    fn service_id(&self) -> &str {
        &self.service_id
    }

    fn domain_routes(self: Arc<Self>) -> Router {
        Router::new()
            .route(REGISTER_PATH, post(register_and_assign))
            .route(ASSIGNMENTS_PATH, get(list_assignments))
            .with_state(self)
    }

    fn describe(&self) -> Vec<String> {
        let assignments = self.assignments();
        let mut lines = vec![format!("Assigned ports: {}", assignments.len())];
        lines.extend(
            assignments
                .iter()
                .map(|a| format!("  {} -> {}", a.task_name, a.port)),
        );
        lines
    }
}

async fn register_and_assign(
    State(registry): State<Arc<PortRegistry>>,
    Json(request): Json<RegisterPortRequest>,
) -> PortRegistryResult<Json<RegisterPortResponse>> {
    // The scan binds probe sockets port by port; keep it off the async workers
    let assignment = tokio::task::spawn_blocking(move || {
        registry.register_and_assign_port(&request.unique_service_name, request.start_from)
    })
    .await
    .map_err(|e| PortRegistryError::Allocation(e.to_string()))??;
    Ok(Json(RegisterPortResponse {
        port: assignment.port,
    }))
}

async fn list_assignments(State(registry): State<Arc<PortRegistry>>) -> Json<Vec<TaskPortAssignment>> {
    Json(registry.assignments())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn registry(base: u16) -> PortRegistry {
        PortRegistry::new("port-registry", IpAddr::V4(Ipv4Addr::LOCALHOST), base)
    }

    #[test]
    fn test_assignment_is_memoized() {
        let registry = registry(26000);

        let first = registry.register_and_assign_port("web", None).unwrap();
        let again = registry.register_and_assign_port("web", Some(27000)).unwrap();

        assert_eq!(first, again);
        assert!(first.assigned);
        assert!(first.port >= 26000);
    }

    #[test]
    fn test_distinct_tasks_get_distinct_ports() {
        let registry = registry(26100);

        let web = registry.register_and_assign_port("web", None).unwrap();
        let api = registry.register_and_assign_port("api", None).unwrap();

        // Neither port is bound yet, so only the registry's memory separates them
        assert_ne!(web.port, api.port);
        assert_eq!(
            registry
                .assignments()
                .iter()
                .map(|a| a.task_name.as_str())
                .collect::<Vec<_>>(),
            ["api", "web"]
        );
    }

    #[test]
    fn test_start_from_is_honoured() {
        let registry = registry(26200);
        let assignment = registry.register_and_assign_port("db", Some(26300)).unwrap();
        assert!(assignment.port >= 26300);
    }

    #[test]
    fn test_empty_task_name_rejected() {
        let registry = registry(26400);
        assert!(matches!(
            registry.register_and_assign_port("  ", None),
            Err(PortRegistryError::InvalidTaskName)
        ));
        assert!(registry.assignments().is_empty());
    }

    #[test]
    fn test_describe_lists_assignments() {
        let registry = registry(26500);
        registry.register_and_assign_port("web", None).unwrap();

        let lines = registry.describe();
        assert_eq!(lines[0], "Assigned ports: 1");
        assert!(lines[1].starts_with("  web -> "));
    }

    #[test]
    fn test_request_wire_shape() {
        let request: RegisterPortRequest =
            serde_json::from_str(r#"{"uniqueServiceName":"web"}"#).unwrap();
        assert_eq!(request.start_from, None);

        let json = serde_json::to_value(RegisterPortRequest {
            unique_service_name: "web".to_string(),
            start_from: Some(5000),
        })
        .unwrap();
        assert_eq!(json["startFrom"], 5000);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_registrations_through_handler() {
        let registry = Arc::new(registry(26600));

        let handles = ["web", "api", "web", "db"].map(|name| {
            let registry = registry.clone();
            tokio::spawn(async move {
                let request = RegisterPortRequest {
                    unique_service_name: name.to_string(),
                    start_from: None,
                };
                register_and_assign(State(registry), Json(request))
                    .await
                    .map(|Json(response)| response.port)
            })
        });

        let mut ports = Vec::new();
        for handle in handles {
            ports.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(ports[0], ports[2]);
        assert_eq!(ports.iter().collect::<HashSet<_>>().len(), 3);
        assert_eq!(registry.assignments().len(), 3);
    }
}
