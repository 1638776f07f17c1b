//! Worker process runtime for Warden
//!
//! A worker binds a loopback port, records itself in its descriptor file,
//! serves the control protocol next to its own domain routes, and watches its
//! descriptor so that a second instance overwriting it is detected.
//!
//! Process exit is left to the embedding binary: kill requests and tamper
//! detection arrive as [`RuntimeEvent`]s on the [`RunningWorker`].

pub mod control;
pub mod error;
pub mod host;
pub mod info_screen;
pub mod runtime;
pub mod watcher;

pub use control::{control_router, ControlState};
pub use error::{RuntimeError, RuntimeResult};
pub use host::{HostOptions, RunningWorker, RuntimeEvent, WorkerHost};
pub use info_screen::{InfoMenuChoice, InfoScreen};
pub use runtime::{WorkerIdentity, WorkerProcessRuntime};
pub use watcher::{DescriptorClaim, TamperWatcher};
