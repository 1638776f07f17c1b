//! Port assignment record held by the port registry

use serde::{Deserialize, Serialize};

/// One logical task's port, as handed out by the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPortAssignment {
    pub task_name: String,
    pub port: u16,
    pub assigned: bool,
}

impl TaskPortAssignment {
    pub fn new(task_name: impl Into<String>, port: u16) -> Self {
        Self {
            task_name: task_name.into(),
            port,
            assigned: true,
        }
    }
}
