//! Client-side worker state machine

use chrono::Utc;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use warden_core::{WorkerDescriptor, WorkerDescriptorStore};
use warden_ipc::{ControlClient, ControlProtocol, InitializeMetadataRequest, IpcError};
use warden_resilience::{poll_until, PollOutcome, RetryExecutor, RetryPolicy, Retryable};
use warden_runtime::{HostOptions, RunningWorker, RuntimeError, WorkerHost, WorkerProcessRuntime};

use crate::error::{SupervisorError, SupervisorResult};
use crate::launcher::WorkerLauncher;
use crate::options::SupervisorOptions;

/// Observable lifecycle state of a service's worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// No descriptor, or nothing answering at the recorded port
    Unstarted,
    /// The recorded worker is still booting
    Starting,
    /// The recorded worker confirms its identity
    Healthy,
    /// Healthy, but older than the version this invocation carries
    Stale,
    /// Killed by this supervisor
    Killed,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            WorkerState::Unstarted => "unstarted",
            WorkerState::Starting => "starting",
            WorkerState::Healthy => "healthy",
            WorkerState::Stale => "stale",
            WorkerState::Killed => "killed",
        };
        f.write_str(state)
    }
}

/// What `start_detached_if_needs_to_be_started` did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    AlreadyRunning(WorkerDescriptor),
    Started(WorkerDescriptor),
}

impl StartOutcome {
    pub fn descriptor(&self) -> &WorkerDescriptor {
        match self {
            StartOutcome::AlreadyRunning(descriptor) | StartOutcome::Started(descriptor) => {
                descriptor
            }
        }
    }
}

/// One failed health-probe attempt
#[derive(Debug)]
enum ProbeFailure {
    NoDescriptor,
    /// The worker answered for another identity than the recorded one
    Refused,
    /// Refused, but the descriptor changed while the probe was in flight
    Repointed,
    Unreachable(IpcError),
}

impl fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeFailure::NoDescriptor => write!(f, "no descriptor recorded"),
            ProbeFailure::Refused => write!(f, "worker does not recognise the recorded identity"),
            ProbeFailure::Repointed => write!(f, "descriptor changed during the probe"),
            ProbeFailure::Unreachable(e) => write!(f, "worker unreachable: {}", e),
        }
    }
}

impl Retryable for ProbeFailure {
    /// Any network failure means "not healthy yet". A worker that answers
    /// but rejects an identity the descriptor still records will not change
    /// its mind.
    fn is_retryable(&self) -> bool {
        !matches!(self, ProbeFailure::Refused)
    }
}

/// Starts, attaches to, kills and restarts the worker of one service
pub struct WorkerSupervisor {
    options: SupervisorOptions,
    store: WorkerDescriptorStore,
    launcher: Arc<dyn WorkerLauncher>,
    http: reqwest::Client,
    connection: Mutex<Option<ControlClient>>,
    killed: AtomicBool,
}

impl WorkerSupervisor {
    pub fn new(
        options: SupervisorOptions,
        launcher: Arc<dyn WorkerLauncher>,
    ) -> SupervisorResult<Self> {
        let http = ControlClient::http_client(options.request_timeout)?;
        let store = options.descriptor_store();

        Ok(Self {
            options,
            store,
            launcher,
            http,
            connection: Mutex::new(None),
            killed: AtomicBool::new(false),
        })
    }

    pub fn service_id(&self) -> &str {
        &self.options.service_id
    }

    pub fn options(&self) -> &SupervisorOptions {
        &self.options
    }

    pub fn store(&self) -> &WorkerDescriptorStore {
        &self.store
    }

    pub fn descriptor(&self) -> WorkerDescriptor {
        self.store.read()
    }

    /// Remote handle to the worker recorded in the descriptor.
    ///
    /// Created on first use and reused while the recorded port stays the same.
    pub fn connection(&self) -> Option<ControlClient> {
        self.connection_for(&self.descriptor())
    }

    fn connection_for(&self, descriptor: &WorkerDescriptor) -> Option<ControlClient> {
        let port = descriptor.port()?;
        let mut cached = self.connection.lock();

        match cached.as_ref() {
            Some(client) if client.port() == port => Some(client.clone()),
            _ => {
                debug!("Opening control connection to {} on port {}", self.service_id(), port);
                let client = ControlClient::new(self.http.clone(), self.options.bind_host, port);
                *cached = Some(client.clone());
                Some(client)
            }
        }
    }

    /// The descriptor as the supervisor would submit it for a version check
    fn candidate(&self) -> WorkerDescriptor {
        WorkerDescriptor {
            service_id: Some(self.options.service_id.clone()),
            version: Some(self.options.version.clone()),
            ..Default::default()
        }
    }

    fn is_abandoned_start(&self, descriptor: &WorkerDescriptor) -> bool {
        let Some(started_at) = descriptor.started_at() else {
            return false;
        };
        let age = Utc::now()
            .signed_duration_since(started_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
        age > self.options.stale_start_after
    }

    /// Phase one of the health probe: wait on the local descriptor while a
    /// worker is booting. No network calls.
    pub async fn wait_while_starting(&self) -> WorkerDescriptor {
        let policy = RetryPolicy::fixed(self.options.boot_wait_attempts, self.options.poll_interval);

        let outcome = poll_until(&policy, |_| async move {
            let descriptor = self.descriptor();
            if !descriptor.is_starting() {
                return Some(descriptor);
            }
            if self.is_abandoned_start(&descriptor) {
                warn!(
                    "Worker for {} has been starting since {:?}, treating the boot as abandoned",
                    self.service_id(),
                    descriptor.started_at()
                );
                return Some(descriptor);
            }
            None
        })
        .await;

        match outcome {
            PollOutcome::Ready { value, .. } => value,
            PollOutcome::Exhausted { attempts } => {
                debug!(
                    "Worker for {} still starting after {} checks",
                    self.service_id(),
                    attempts
                );
                self.descriptor()
            }
        }
    }

    async fn health_attempt(&self) -> Result<(), ProbeFailure> {
        // Re-read every attempt: a winning worker may have re-pointed the descriptor
        let descriptor = self.descriptor();
        let connection = self
            .connection_for(&descriptor)
            .ok_or(ProbeFailure::NoDescriptor)?;

        match connection.is_healthy(&descriptor).await {
            Ok(true) => Ok(()),
            Ok(false) if self.descriptor() != descriptor => Err(ProbeFailure::Repointed),
            Ok(false) => Err(ProbeFailure::Refused),
            Err(e) => Err(ProbeFailure::Unreachable(e)),
        }
    }

    /// Two-phase health probe.
    ///
    /// Waits out a boot in progress, then asks the worker `isHealthy` up to
    /// `retries` times, one poll interval apart.
    pub async fn is_healthy(&self, retries: u32) -> bool {
        let descriptor = self.wait_while_starting().await;
        if descriptor.is_empty() {
            debug!("No worker recorded for {}", self.service_id());
            return false;
        }

        let executor = RetryExecutor::new(RetryPolicy::fixed(retries, self.options.poll_interval));
        match executor.execute(|| self.health_attempt()).await {
            Ok(()) => true,
            Err(e) => {
                debug!("Worker for {} is not healthy: {}", self.service_id(), e);
                false
            }
        }
    }

    /// Ask a healthy worker whether it is at least this invocation's version
    /// and kill it, keeping the descriptor, if it is not. Returns whether the
    /// worker was preempted.
    pub async fn preempt_if_outdated(&self) -> bool {
        let Some(connection) = self.connection() else {
            return false;
        };

        match connection.has_up_to_date_version(&self.candidate()).await {
            Ok(true) => false,
            Ok(false) => {
                info!(
                    "Running {} is older than {}, replacing it",
                    self.service_id(),
                    self.options.version
                );
                self.kill(true).await;
                true
            }
            Err(e) => {
                warn!("Version check against {} failed: {}", self.service_id(), e);
                false
            }
        }
    }

    /// Start a detached worker unless a healthy, up-to-date one is running
    pub async fn start_detached_if_needs_to_be_started(&self) -> SupervisorResult<StartOutcome> {
        if self.descriptor().is_empty() {
            return self
                .start_detached(self.options.detached_health_check_retries)
                .await
                .map(StartOutcome::Started);
        }

        if self.is_healthy(self.options.health_check_retries).await && !self.preempt_if_outdated().await
        {
            info!("{} is already running", self.service_id());
            return Ok(StartOutcome::AlreadyRunning(self.descriptor()));
        }

        self.start_detached(self.options.detached_health_check_retries)
            .await
            .map(StartOutcome::Started)
    }

    /// Launch a worker and wait for it to become healthy.
    ///
    /// Fails only when the health probe exhausts `retries`.
    pub async fn start_detached(&self, retries: u32) -> SupervisorResult<WorkerDescriptor> {
        info!("Starting {} ({})", self.service_id(), self.options.version);
        self.killed.store(false, Ordering::SeqCst);

        let launched = self.launcher.launch(self.service_id()).await?;

        let policy = RetryPolicy::fixed(self.options.boot_wait_attempts, self.options.poll_interval);
        let recorded = poll_until(&policy, |_| async move {
            (self.descriptor().pid() == Some(launched.pid)).then_some(())
        })
        .await;

        if !recorded.is_ready() {
            // Lost a port race: the descriptor names another worker, which we
            // initialize and probe instead
            warn!(
                "Worker pid {} for {} never recorded itself, continuing with {}",
                launched.pid,
                self.service_id(),
                self.descriptor()
            );
        }

        self.confirm_started(retries).await
    }

    /// Initialize metadata on the recorded worker, then probe it
    async fn confirm_started(&self, retries: u32) -> SupervisorResult<WorkerDescriptor> {
        let request = &InitializeMetadataRequest::new(self.service_id(), self.options.version.clone());
        let executor = RetryExecutor::new(RetryPolicy::fixed(retries, self.options.poll_interval));

        let initialized = executor
            .execute(|| async move {
                let connection = self.connection().ok_or(ProbeFailure::NoDescriptor)?;
                connection
                    .initialize_metadata(request.clone())
                    .await
                    .map_err(ProbeFailure::Unreachable)
            })
            .await;

        if let Err(e) = initialized {
            warn!("Metadata initialization of {} failed: {}", self.service_id(), e);
        }

        if self.is_healthy(retries).await {
            let descriptor = self.descriptor();
            info!("{} is running: {}", self.service_id(), descriptor);
            Ok(descriptor)
        } else {
            Err(SupervisorError::StartFailed {
                service_id: self.service_id().to_string(),
                attempts: retries,
            })
        }
    }

    /// Host the worker in this process unless a healthy, up-to-date one is
    /// already running elsewhere. Returns `None` when attaching to it.
    pub async fn start_in_current_process_if_needed(
        &self,
        runtime: Arc<dyn WorkerProcessRuntime>,
        host: HostOptions,
    ) -> SupervisorResult<Option<RunningWorker>> {
        if !self.descriptor().is_empty()
            && self.is_healthy(self.options.health_check_retries).await
            && !self.preempt_if_outdated().await
        {
            info!("{} is already running", self.service_id());
            return Ok(None);
        }

        self.killed.store(false, Ordering::SeqCst);

        let worker = match WorkerHost::new(runtime, self.store.clone(), host).start().await {
            Ok(worker) => worker,
            Err(RuntimeError::Bind { address, source }) => {
                // Another invocation won the port; attach to it if it comes up
                warn!("Could not bind {}: {}", address, source);
                if self.is_healthy(self.options.detached_health_check_retries).await {
                    return Ok(None);
                }
                return Err(SupervisorError::StartFailed {
                    service_id: self.service_id().to_string(),
                    attempts: self.options.detached_health_check_retries,
                });
            }
            Err(e) => return Err(e.into()),
        };

        self.confirm_started(self.options.detached_health_check_retries)
            .await?;
        Ok(Some(worker))
    }

    /// Best-effort kill of the recorded worker.
    ///
    /// With `dont_remove_descriptor` the file is left in place as a
    /// breadcrumb. Failures are logged, never returned.
    pub async fn kill(&self, dont_remove_descriptor: bool) {
        let descriptor = self.descriptor();
        if descriptor.is_empty() {
            debug!("Nothing to kill for {}", self.service_id());
            return;
        }

        // The worker releases its descriptor on the kill request; removal comes after
        match self.connection_for(&descriptor) {
            Some(connection) => match connection.kill().await {
                Ok(()) => info!("Killed {}", descriptor),
                Err(e) => debug!(
                    "Kill of {} not delivered, it may already be gone: {}",
                    descriptor, e
                ),
            },
            None => debug!("No port recorded for {}", self.service_id()),
        }

        if !dont_remove_descriptor {
            if let Err(e) = self.store.remove() {
                warn!("Failed to remove descriptor of {}: {}", self.service_id(), e);
            }
        }

        self.killed.store(true, Ordering::SeqCst);
    }

    /// Kill, then start with the larger restart health budget
    pub async fn restart(&self) -> SupervisorResult<WorkerDescriptor> {
        info!("Restarting {}", self.service_id());
        self.kill(false).await;
        self.start_detached(self.options.restart_health_check_retries)
            .await
    }

    /// Single-shot view of the worker's state
    pub async fn state(&self) -> WorkerState {
        if self.killed.load(Ordering::SeqCst) {
            return WorkerState::Killed;
        }

        let descriptor = self.descriptor();
        if descriptor.is_empty() {
            return WorkerState::Unstarted;
        }
        if descriptor.is_starting() && !self.is_abandoned_start(&descriptor) {
            return WorkerState::Starting;
        }

        let Some(connection) = self.connection_for(&descriptor) else {
            return WorkerState::Unstarted;
        };

        match connection.is_healthy(&descriptor).await {
            Ok(true) => match connection.has_up_to_date_version(&self.candidate()).await {
                Ok(false) => WorkerState::Stale,
                _ => WorkerState::Healthy,
            },
            _ => WorkerState::Unstarted,
        }
    }
}
