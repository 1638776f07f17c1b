//! CLI argument parsing definitions

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Set the log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Run as worker process (internal use)
    #[arg(long, hide = true)]
    pub worker: bool,

    /// Service hosted by the worker (used with --worker)
    #[arg(long, value_name = "ID", hide = true, requires = "worker")]
    pub worker_service: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run, start, restart or kill the port registry worker
    PortRegistry(WorkerFlags),

    /// Print the port assigned to a task, starting the registry if needed
    AssignPort {
        /// Unique task name
        #[arg(value_name = "TASK")]
        task: String,

        /// First port to consider for a new assignment
        #[arg(long, value_name = "PORT")]
        start_from: Option<u16>,
    },

    /// Print the running port registry's info
    Info,
}

/// Lifecycle flags shared by every worker type
#[derive(Args, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerFlags {
    /// Kill the running worker and start a new one in the background
    #[arg(long, conflicts_with_all = ["kill", "detached", "sync"])]
    pub restart: bool,

    /// Kill the running worker
    #[arg(long, conflicts_with_all = ["detached", "sync"])]
    pub kill: bool,

    /// Start the worker in the background and return
    #[arg(long, visible_alias = "detach", conflicts_with = "sync")]
    pub detached: bool,

    /// Run the worker in this process without the interactive menu
    #[arg(long)]
    pub sync: bool,
}

/// What a worker command was asked to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerAction {
    Foreground,
    Sync,
    Detached,
    Restart,
    Kill,
}

impl WorkerFlags {
    pub fn action(self) -> WorkerAction {
        if self.restart {
            WorkerAction::Restart
        } else if self.kill {
            WorkerAction::Kill
        } else if self.detached {
            WorkerAction::Detached
        } else if self.sync {
            WorkerAction::Sync
        } else {
            WorkerAction::Foreground
        }
    }
}
