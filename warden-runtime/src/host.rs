//! Worker bootstrap and serving

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{info, warn};
use warden_core::{
    find_free_port, DescriptorPatch, WorkerDescriptor, WorkerDescriptorStore,
    DEFAULT_WORKER_PORT_BASE,
};
use warden_ipc::ControlOperation;

use crate::control::{control_router, ControlState};
use crate::error::{RuntimeError, RuntimeResult};
use crate::runtime::{WorkerIdentity, WorkerProcessRuntime};

/// Something the embedding process has to act on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeEvent {
    /// A client asked the worker to exit; the grace delay has elapsed
    KillRequested,
    /// The descriptor no longer describes this worker
    Tampered {
        expected: WorkerDescriptor,
        found: WorkerDescriptor,
    },
}

/// How a worker binds and identifies itself
#[derive(Debug, Clone)]
pub struct HostOptions {
    pub bind_host: IpAddr,
    /// First port tried by the free-port scan
    pub port_base: u16,
    pub pid: u32,
    pub version: String,
    pub kill_delay: Duration,
    /// Watch the descriptor for tampering from the boot write on
    pub watch_descriptor: bool,
}

impl HostOptions {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            bind_host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port_base: DEFAULT_WORKER_PORT_BASE,
            pid: std::process::id(),
            version: version.into(),
            kill_delay: Duration::from_millis(300),
            watch_descriptor: true,
        }
    }

    pub fn with_bind_host(mut self, bind_host: IpAddr) -> Self {
        self.bind_host = bind_host;
        self
    }

    pub fn with_port_base(mut self, port_base: u16) -> Self {
        self.port_base = port_base;
        self
    }

    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = pid;
        self
    }

    pub fn with_kill_delay(mut self, kill_delay: Duration) -> Self {
        self.kill_delay = kill_delay;
        self
    }

    pub fn with_descriptor_watch(mut self, enabled: bool) -> Self {
        self.watch_descriptor = enabled;
        self
    }
}

/// Boots one worker: reserve a port, record it, bind, serve.
pub struct WorkerHost {
    runtime: Arc<dyn WorkerProcessRuntime>,
    store: WorkerDescriptorStore,
    options: HostOptions,
}

impl WorkerHost {
    pub fn new(
        runtime: Arc<dyn WorkerProcessRuntime>,
        store: WorkerDescriptorStore,
        options: HostOptions,
    ) -> Self {
        Self {
            runtime,
            store,
            options,
        }
    }

    /// Start serving.
    ///
    /// The descriptor is written with a boot marker *before* the bind. If a
    /// racing process wins the same port, the bind fails here and the
    /// winner's metadata initialization later re-points the descriptor.
    ///
    /// Once bound, the worker watches the descriptor against its boot record.
    /// A worker that scanned past this one's port and recorded itself on
    /// another one wins the descriptor, and this worker reports
    /// [`RuntimeEvent::Tampered`] whether or not it was ever initialized.
    pub async fn start(self) -> RuntimeResult<RunningWorker> {
        let WorkerHost {
            runtime,
            store,
            options,
        } = self;

        let port = find_free_port(options.bind_host, options.port_base)?;
        let identity = WorkerIdentity {
            service_id: store.service_id().to_string(),
            version: options.version.clone(),
            port,
            pid: options.pid,
        };

        let boot = store.write(&DescriptorPatch::from(&identity.descriptor()).starting_now())?;

        let address = SocketAddr::new(options.bind_host, port);
        let listener = TcpListener::bind(address)
            .await
            .map_err(|source| RuntimeError::Bind { address, source })?;

        info!(
            "Worker {} listening on {} (pid {})",
            identity.service_id, address, identity.pid
        );

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let state = Arc::new(ControlState::new(
            runtime.clone(),
            store,
            identity,
            boot,
            events_tx,
            options.kill_delay,
        ));
        if options.watch_descriptor {
            state.start_watcher().await?;
        }

        let app = control_router(state.clone()).merge(runtime.domain_routes());

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        Ok(RunningWorker {
            state,
            address,
            events: events_rx,
            shutdown_tx: Some(shutdown_tx),
            server: Some(server),
        })
    }
}

/// Handle to a serving worker
pub struct RunningWorker {
    state: Arc<ControlState>,
    address: SocketAddr,
    events: mpsc::UnboundedReceiver<RuntimeEvent>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    server: Option<JoinHandle<std::io::Result<()>>>,
}

impl RunningWorker {
    pub fn port(&self) -> u16 {
        self.address.port()
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn pid(&self) -> u32 {
        self.state.identity().pid
    }

    pub fn service_id(&self) -> String {
        self.state.identity().service_id
    }

    /// Browser-openable status page
    pub fn info_url(&self) -> String {
        format!("http://{}{}", self.address, ControlOperation::Info.path())
    }

    /// Direct access to the control state, bypassing HTTP
    pub fn control(&self) -> Arc<ControlState> {
        self.state.clone()
    }

    /// Wait for the next kill request or tamper detection
    pub async fn next_event(&mut self) -> Option<RuntimeEvent> {
        self.events.recv().await
    }

    /// Stop the watcher and the server
    pub async fn shutdown(mut self) -> RuntimeResult<()> {
        self.state.stop_watcher().await;

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(server) = self.server.take() {
            match timeout(Duration::from_secs(5), server).await {
                Ok(Ok(result)) => result.map_err(RuntimeError::Server)?,
                Ok(Err(e)) => warn!("Worker server task failed: {}", e),
                Err(_) => warn!("Worker server shutdown timed out"),
            }
        }

        info!("Worker {} stopped", self.state.identity().service_id);
        Ok(())
    }
}

impl Drop for RunningWorker {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
