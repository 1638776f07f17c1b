//! Worker supervision for Warden
//!
//! A [`WorkerSupervisor`] is created by every command invocation. It reads the
//! service's descriptor, decides whether a worker must be started, probes
//! health over the control protocol, and performs kill and restart.
//!
//! How a worker process comes into existence is behind [`WorkerLauncher`]:
//! [`ProcessLauncher`] re-executes the current binary in worker mode, and the
//! `testing` feature adds an in-process launcher.

pub mod error;
pub mod launcher;
pub mod options;
pub mod supervisor;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{SupervisorError, SupervisorResult};
pub use launcher::{LaunchedWorker, ProcessLauncher, WorkerLauncher};
pub use options::SupervisorOptions;
pub use supervisor::{StartOutcome, WorkerState, WorkerSupervisor};
