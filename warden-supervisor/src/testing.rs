//! In-process worker launcher for tests
//!
//! Hosts each launched worker on a tokio task with a made-up pid, so the
//! whole start, probe, kill and restart cycle runs without spawning
//! processes. A hosted worker shuts down on a kill request or when its
//! descriptor is tampered with, the same way the `warden` binary exits.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;
use warden_core::WorkerDescriptorStore;
use warden_runtime::{HostOptions, RuntimeError, WorkerHost, WorkerProcessRuntime};

use crate::error::SupervisorResult;
use crate::launcher::{LaunchedWorker, WorkerLauncher};
use crate::options::SupervisorOptions;

type RuntimeFactory = dyn Fn() -> Arc<dyn WorkerProcessRuntime> + Send + Sync;

const FIRST_FAKE_PID: u32 = 40_000;

pub struct InProcessLauncher {
    factory: Box<RuntimeFactory>,
    state_dir: PathBuf,
    host: HostOptions,
    next_pid: AtomicU32,
    launches: AtomicU32,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl InProcessLauncher {
    pub fn new<F>(factory: F, options: &SupervisorOptions) -> Self
    where
        F: Fn() -> Arc<dyn WorkerProcessRuntime> + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(factory),
            state_dir: options.state_dir.clone(),
            host: options.host_options(),
            next_pid: AtomicU32::new(FIRST_FAKE_PID),
            launches: AtomicU32::new(0),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Fake pids start here. Launchers sharing a state directory need
    /// disjoint ranges.
    pub fn with_first_pid(self, pid: u32) -> Self {
        self.next_pid.store(pid, Ordering::SeqCst);
        self
    }

    pub fn launch_count(&self) -> u32 {
        self.launches.load(Ordering::SeqCst)
    }

    /// Number of hosted workers still serving
    pub fn live_workers(&self) -> usize {
        self.workers
            .lock()
            .iter()
            .filter(|handle| !handle.is_finished())
            .count()
    }
}

#[async_trait]
impl WorkerLauncher for InProcessLauncher {
    async fn launch(&self, service_id: &str) -> SupervisorResult<LaunchedWorker> {
        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        self.launches.fetch_add(1, Ordering::SeqCst);

        let store = WorkerDescriptorStore::new(&self.state_dir, service_id);
        let options = self.host.clone().with_pid(pid);
        let mut worker = match WorkerHost::new((self.factory)(), store, options).start().await {
            Ok(worker) => worker,
            Err(RuntimeError::Bind { address, .. }) => {
                // A spawned process losing the bind race exits; its pid was
                // still handed out
                debug!("In-process worker {} lost the bind of {}", pid, address);
                return Ok(LaunchedWorker { pid });
            }
            Err(e) => return Err(e.into()),
        };

        let handle = tokio::spawn(async move {
            if let Some(event) = worker.next_event().await {
                debug!("In-process worker {} stopping on {:?}", worker.pid(), event);
                let _ = worker.shutdown().await;
            }
        });
        self.workers.lock().push(handle);

        Ok(LaunchedWorker { pid })
    }
}
