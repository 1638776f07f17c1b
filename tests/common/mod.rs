//! Shared fixtures: supervisors over a temporary state directory whose
//! workers are hosted in-process

#![allow(dead_code)]

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use warden_ports::PortRegistry;
use warden_runtime::WorkerProcessRuntime;
use warden_supervisor::testing::InProcessLauncher;
use warden_supervisor::{SupervisorOptions, WorkerSupervisor};

pub const SERVICE_ID: &str = "port-registry";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_test_writer()
        .try_init();
}

pub fn options(state_dir: &TempDir, version: &str, port_base: u16) -> SupervisorOptions {
    SupervisorOptions::new(SERVICE_ID, version, state_dir.path())
        .with_poll_interval(Duration::from_millis(50))
        .with_worker_port_base(port_base)
        .with_kill_delay(Duration::from_millis(20))
}

/// Launcher hosting port registries that assign from `port_base + 500`
pub fn registry_launcher(options: &SupervisorOptions, first_pid: u32) -> Arc<InProcessLauncher> {
    let assignment_base = options.worker_port_base + 500;
    Arc::new(
        InProcessLauncher::new(
            move || {
                Arc::new(PortRegistry::new(
                    SERVICE_ID,
                    IpAddr::V4(Ipv4Addr::LOCALHOST),
                    assignment_base,
                )) as Arc<dyn WorkerProcessRuntime>
            },
            options,
        )
        .with_first_pid(first_pid),
    )
}

pub fn supervisor(options: SupervisorOptions, launcher: Arc<InProcessLauncher>) -> WorkerSupervisor {
    WorkerSupervisor::new(options, launcher).expect("supervisor")
}

/// Poll `check` every 50ms for up to two seconds
pub async fn eventually<F>(mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..40 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    check()
}
