//! Logging initialisation for Warden
//!
//! Interactive processes log to stderr so the info screen keeps stdout to
//! itself. Detached workers have no terminal, so they log to a file under the
//! state directory instead.

pub mod init;

pub use init::{init_logging_from_config, init_simple_tracing, worker_log_file, LoggingGuard};
