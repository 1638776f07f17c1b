//! Descriptor tamper detection
//!
//! From its boot write on, a worker is the sole owner of its descriptor. Any
//! change to the file that does not match the worker's own snapshot means a
//! second instance has claimed the service, and the worker must fail fast.
//! The one exception is a boot record on this worker's own port: its writer
//! lost the bind and is gone, and metadata initialization overwrites it.

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::ffi::OsString;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, error, info};
use warden_core::{WorkerDescriptor, WorkerDescriptorStore};

use crate::error::RuntimeResult;
use crate::host::RuntimeEvent;

const DEBOUNCE: Duration = Duration::from_millis(100);

/// Whether a worker still claims its descriptor.
///
/// Released on a kill request or on tamper detection. The worker's own
/// descriptor writes and the tamper check both run under the claim's lock, so
/// a write never lands after the worker gave the descriptor up.
#[derive(Debug, Default)]
pub struct DescriptorClaim {
    released: Mutex<bool>,
}

impl DescriptorClaim {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn is_released(&self) -> bool {
        *self.released.lock()
    }

    /// Give the descriptor up. Returns whether it was still held.
    pub fn release(&self) -> bool {
        let mut released = self.released.lock();
        !std::mem::replace(&mut *released, true)
    }

    /// Run `f` while the claim is held, `None` once released
    pub fn while_held<T>(&self, f: impl FnOnce() -> T) -> Option<T> {
        let released = self.released.lock();
        if *released {
            return None;
        }
        Some(f())
    }

    /// Release when `diverged` says so, atomically with the decision
    fn release_if<T>(&self, diverged: impl FnOnce() -> Option<T>) -> Option<T> {
        let mut released = self.released.lock();
        if *released {
            return None;
        }
        let found = diverged();
        if found.is_some() {
            *released = true;
        }
        found
    }
}

/// Watches one descriptor file and reports the first divergence
pub struct TamperWatcher {
    watcher: Option<RecommendedWatcher>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    processor_handle: Option<tokio::task::JoinHandle<()>>,
}

impl TamperWatcher {
    /// Start watching `store`'s file.
    ///
    /// `expected` carries the worker's current snapshot; the worker updates
    /// it before each of its own writes. The file is checked once right away,
    /// so a write that landed before the watch began is not missed. At most
    /// one [`RuntimeEvent::Tampered`] is sent on `events`, and none once
    /// `claim` is released.
    pub fn start(
        store: WorkerDescriptorStore,
        expected: watch::Receiver<WorkerDescriptor>,
        claim: Arc<DescriptorClaim>,
        events: mpsc::UnboundedSender<RuntimeEvent>,
    ) -> RuntimeResult<Self> {
        let file_name = store.path().file_name().map(OsString::from);
        let (change_tx, change_rx) = mpsc::unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if concerns_descriptor(&event, file_name.as_deref()) {
                        let _ = change_tx.send(());
                    }
                }
                Err(e) => error!("Notify error: {}", e),
            },
            Config::default(),
        )?;

        watcher.watch(store.directory(), RecursiveMode::NonRecursive)?;
        info!("Watching descriptor {:?}", store.path());

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let processor = TamperCheck {
            store,
            expected,
            claim,
            events,
        };
        let handle = tokio::spawn(processor.run(change_rx, shutdown_rx));

        Ok(Self {
            watcher: Some(watcher),
            shutdown_tx: Some(shutdown_tx),
            processor_handle: Some(handle),
        })
    }

    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(handle) = self.processor_handle.take() {
            let _ = timeout(Duration::from_secs(5), handle).await;
        }

        self.watcher = None;
        debug!("Descriptor watcher stopped");
    }
}

fn concerns_descriptor(event: &Event, file_name: Option<&std::ffi::OsStr>) -> bool {
    if matches!(event.kind, EventKind::Access(_)) {
        return false;
    }
    event
        .paths
        .iter()
        .any(|path| path.file_name() == file_name)
}

struct TamperCheck {
    store: WorkerDescriptorStore,
    expected: watch::Receiver<WorkerDescriptor>,
    claim: Arc<DescriptorClaim>,
    events: mpsc::UnboundedSender<RuntimeEvent>,
}

impl TamperCheck {
    async fn run(
        self,
        mut change_rx: mpsc::UnboundedReceiver<()>,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) {
        let mut pending = true;
        let mut debounce_interval = interval(DEBOUNCE);
        debounce_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                Some(()) = change_rx.recv() => {
                    pending = true;
                }

                _ = debounce_interval.tick() => {
                    if self.claim.is_released() {
                        debug!("Descriptor released, no longer watching");
                        break;
                    }
                    if pending {
                        pending = false;
                        if let Some(event) = self.claim.release_if(|| self.check()) {
                            let _ = self.events.send(event);
                            break;
                        }
                    }
                }

                _ = &mut shutdown_rx => {
                    break;
                }
            }
        }
    }

    fn check(&self) -> Option<RuntimeEvent> {
        let found = self.store.read();
        let expected = self.expected.borrow().clone();

        if found == expected {
            debug!("Descriptor change matches own snapshot");
            return None;
        }

        if found.is_starting() && found.port() == expected.port() && found.pid() != expected.pid() {
            debug!(
                "Descriptor names booting pid {:?} on this worker's port, left for initialization to overwrite",
                found.pid()
            );
            return None;
        }

        error!(
            "Descriptor for {} changed underneath this worker: expected {}, found {}",
            self.store.service_id(),
            expected,
            found
        );
        Some(RuntimeEvent::Tampered { expected, found })
    }
}
