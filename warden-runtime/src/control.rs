//! Server side of the control protocol

use async_trait::async_trait;
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post, MethodRouter},
    Json, Router,
};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, warn};
use warden_core::{DescriptorPatch, WorkerDescriptor, WorkerDescriptorStore};
use warden_ipc::{ControlOperation, ControlProtocol, InitializeMetadataRequest, IpcResult};

use crate::error::{RuntimeError, RuntimeResult};
use crate::host::RuntimeEvent;
use crate::runtime::{WorkerIdentity, WorkerProcessRuntime};
use crate::watcher::{DescriptorClaim, TamperWatcher};

/// State shared by the control handlers of one worker
pub struct ControlState {
    runtime: Arc<dyn WorkerProcessRuntime>,
    store: WorkerDescriptorStore,
    identity: RwLock<WorkerIdentity>,
    expected: watch::Sender<WorkerDescriptor>,
    events: mpsc::UnboundedSender<RuntimeEvent>,
    watcher: Mutex<Option<TamperWatcher>>,
    claim: Arc<DescriptorClaim>,
    kill_delay: Duration,
    kill_requested: AtomicBool,
}

impl ControlState {
    /// `boot` is the descriptor as the worker's boot write left it
    pub(crate) fn new(
        runtime: Arc<dyn WorkerProcessRuntime>,
        store: WorkerDescriptorStore,
        identity: WorkerIdentity,
        boot: WorkerDescriptor,
        events: mpsc::UnboundedSender<RuntimeEvent>,
        kill_delay: Duration,
    ) -> Self {
        let (expected, _) = watch::channel(boot);

        Self {
            runtime,
            store,
            identity: RwLock::new(identity),
            expected,
            events,
            watcher: Mutex::new(None),
            claim: DescriptorClaim::new(),
            kill_delay,
            kill_requested: AtomicBool::new(false),
        }
    }

    pub fn identity(&self) -> WorkerIdentity {
        self.identity.read().clone()
    }

    pub fn store(&self) -> &WorkerDescriptorStore {
        &self.store
    }

    pub fn kill_requested(&self) -> bool {
        self.kill_requested.load(Ordering::SeqCst)
    }

    /// Whether the descriptor has been given up to a kill or a tamper
    pub fn descriptor_released(&self) -> bool {
        self.claim.is_released()
    }

    /// Watch the descriptor against this worker's snapshot until shutdown
    pub(crate) async fn start_watcher(&self) -> RuntimeResult<()> {
        let mut watcher = self.watcher.lock().await;
        if watcher.is_none() {
            *watcher = Some(TamperWatcher::start(
                self.store.clone(),
                self.expected.subscribe(),
                self.claim.clone(),
                self.events.clone(),
            )?);
        }
        Ok(())
    }

    /// Adopt the caller's identity and re-assert it in the descriptor.
    ///
    /// The write clears the boot marker. When two invocations raced for the
    /// same port, it also re-points the descriptor at this worker, the one
    /// that actually won the bind. Refused once the descriptor was released.
    pub async fn apply_metadata(&self, request: InitializeMetadataRequest) -> RuntimeResult<()> {
        if self.claim.is_released() {
            return Err(RuntimeError::Released);
        }

        let descriptor = {
            let mut identity = self.identity.write();
            if identity.service_id != request.service_id {
                warn!(
                    "Worker registered as {} is being initialized as {}",
                    identity.service_id, request.service_id
                );
            }
            identity.service_id = request.service_id;
            identity.version = request.service_version;
            identity.descriptor()
        };

        // Expected snapshot first, so the watcher never sees our own write as foreign
        self.claim
            .while_held(|| {
                self.expected.send_replace(descriptor.clone());
                self.store.write(&DescriptorPatch::from(&descriptor).started())
            })
            .ok_or(RuntimeError::Released)??;

        info!("Initialized metadata: {}", descriptor);
        Ok(())
    }

    /// Schedule termination after the kill delay so the response can flush
    pub fn request_kill(&self) {
        if self.kill_requested.swap(true, Ordering::SeqCst) {
            debug!("Kill already requested");
            return;
        }
        // The caller may remove the descriptor next; that is not tampering
        self.claim.release();

        info!(
            "Kill requested, shutting down in {:?}",
            self.kill_delay
        );
        let events = self.events.clone();
        let delay = self.kill_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(RuntimeEvent::KillRequested);
        });
    }

    pub fn describe(&self) -> String {
        let identity = self.identity();
        let mut lines = vec![
            format!("Service: {}", identity.service_id),
            format!("Port: {}", identity.port),
            format!("PID: {}", identity.pid),
            format!("Version: {}", identity.version),
        ];
        lines.extend(self.runtime.describe());
        lines.join("\n")
    }

    pub fn is_same_worker(&self, candidate: &WorkerDescriptor) -> bool {
        self.identity().descriptor().is_same_worker(candidate)
    }

    pub fn is_up_to_date_against(&self, candidate: &WorkerDescriptor) -> bool {
        self.identity()
            .descriptor()
            .has_bigger_or_equal_version_than(candidate)
    }

    pub(crate) async fn stop_watcher(&self) {
        if let Some(mut watcher) = self.watcher.lock().await.take() {
            watcher.stop().await;
        }
    }
}

#[async_trait]
impl ControlProtocol for ControlState {
    async fn initialize_metadata(&self, request: InitializeMetadataRequest) -> IpcResult<()> {
        Ok(self.apply_metadata(request).await?)
    }

    async fn kill(&self) -> IpcResult<()> {
        self.request_kill();
        Ok(())
    }

    async fn info(&self) -> IpcResult<String> {
        Ok(self.describe())
    }

    async fn is_healthy(&self, candidate: &WorkerDescriptor) -> IpcResult<bool> {
        Ok(self.is_same_worker(candidate))
    }

    async fn has_up_to_date_version(&self, candidate: &WorkerDescriptor) -> IpcResult<bool> {
        Ok(self.is_up_to_date_against(candidate))
    }
}

/// Route table for the control operations, one entry per operation
pub fn control_router(state: Arc<ControlState>) -> Router {
    ControlOperation::ALL
        .into_iter()
        .fold(Router::new(), |router, operation| {
            router.route(operation.path(), handler_for(operation))
        })
        .with_state(state)
}

fn handler_for(operation: ControlOperation) -> MethodRouter<Arc<ControlState>> {
    match operation {
        ControlOperation::InitializeMetadata => post(initialize_metadata),
        ControlOperation::Kill => post(kill),
        ControlOperation::Info => get(info),
        ControlOperation::IsHealthy => post(is_healthy),
        ControlOperation::HasUpToDateVersion => post(has_up_to_date_version),
    }
}

async fn initialize_metadata(
    State(state): State<Arc<ControlState>>,
    Json(request): Json<InitializeMetadataRequest>,
) -> RuntimeResult<StatusCode> {
    state.apply_metadata(request).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn kill(State(state): State<Arc<ControlState>>) -> StatusCode {
    state.request_kill();
    StatusCode::NO_CONTENT
}

async fn info(State(state): State<Arc<ControlState>>) -> String {
    state.describe()
}

async fn is_healthy(
    State(state): State<Arc<ControlState>>,
    Json(candidate): Json<WorkerDescriptor>,
) -> Json<bool> {
    Json(state.is_same_worker(&candidate))
}

async fn has_up_to_date_version(
    State(state): State<Arc<ControlState>>,
    Json(candidate): Json<WorkerDescriptor>,
) -> Json<bool> {
    Json(state.is_up_to_date_against(&candidate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Echo;

    impl WorkerProcessRuntime for Echo {
        fn service_id(&self) -> &str {
            "echo"
        }

        fn describe(&self) -> Vec<String> {
            vec!["Mode: echo".to_string()]
        }
    }

    fn state() -> (TempDir, Arc<ControlState>, mpsc::UnboundedReceiver<RuntimeEvent>) {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = WorkerDescriptorStore::new(temp_dir.path(), "echo");
        let (tx, rx) = mpsc::unbounded_channel();
        let identity = WorkerIdentity {
            service_id: "echo".to_string(),
            version: "0.0.0".to_string(),
            port: 3600,
            pid: 77,
        };
        let boot = identity.descriptor();
        let state = ControlState::new(
            Arc::new(Echo),
            store,
            identity,
            boot,
            tx,
            Duration::from_millis(10),
        );
        (temp_dir, Arc::new(state), rx)
    }

    #[tokio::test]
    async fn test_initialize_metadata_heals_descriptor() {
        let (_dir, state, _rx) = state();
        // A losing invocation left its own pid behind
        state
            .store()
            .write(&DescriptorPatch::new().service_id("echo").port(3600).pid(5).starting_now())
            .unwrap();

        state
            .initialize_metadata(InitializeMetadataRequest::new("echo", "1.4.0"))
            .await
            .unwrap();

        let on_disk = state.store().read();
        assert_eq!(on_disk, WorkerDescriptor::started("echo", 3600, 77, "1.4.0"));
        assert!(!on_disk.is_starting());
    }

    #[tokio::test]
    async fn test_initialize_metadata_is_idempotent() {
        let (_dir, state, _rx) = state();
        let request = InitializeMetadataRequest::new("echo", "1.0.0");

        state.initialize_metadata(request.clone()).await.unwrap();
        let first = state.store().read();
        state.initialize_metadata(request).await.unwrap();

        assert_eq!(state.store().read(), first);
        assert_eq!(state.identity().version, "1.0.0");
    }

    #[tokio::test]
    async fn test_is_healthy_compares_identity_triple() {
        let (_dir, state, _rx) = state();

        let mine = WorkerDescriptor::started("echo", 3600, 77, "9.9.9");
        let foreign_pid = WorkerDescriptor::started("echo", 3600, 78, "0.0.0");

        assert!(state.is_healthy(&mine).await.unwrap());
        assert!(!state.is_healthy(&foreign_pid).await.unwrap());
        assert!(!state.is_healthy(&WorkerDescriptor::default()).await.unwrap());
    }

    #[tokio::test]
    async fn test_has_up_to_date_version() {
        let (_dir, state, _rx) = state();
        state
            .initialize_metadata(InitializeMetadataRequest::new("echo", "1.0.0"))
            .await
            .unwrap();

        let newer = WorkerDescriptor::started("echo", 1, 1, "1.1.0");
        let older = WorkerDescriptor::started("echo", 1, 1, "0.9.0");

        assert!(!state.has_up_to_date_version(&newer).await.unwrap());
        assert!(state.has_up_to_date_version(&older).await.unwrap());
    }

    #[tokio::test]
    async fn test_kill_emits_single_event_after_delay() {
        let (_dir, state, mut rx) = state();

        state.kill().await.unwrap();
        state.kill().await.unwrap();
        assert!(state.kill_requested());

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap();
        assert!(matches!(event, Some(RuntimeEvent::KillRequested)));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_info_lists_identity_and_domain_lines() {
        let (_dir, state, _rx) = state();
        let info = state.info().await.unwrap();

        assert!(info.contains("Service: echo"));
        assert!(info.contains("PID: 77"));
        assert!(info.ends_with("Mode: echo"));
    }

    #[tokio::test]
    async fn test_kill_releases_descriptor_and_refuses_initialization() {
        let (_dir, state, _rx) = state();

        state.kill().await.unwrap();
        assert!(state.descriptor_released());

        let err = state
            .initialize_metadata(InitializeMetadataRequest::new("echo", "1.0.0"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("released"));
        assert!(state.store().read().is_empty());
    }
}
