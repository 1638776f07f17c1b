mod cli;
mod commands;
mod worker;

use anyhow::{Context as _, Result};
use clap::{CommandFactory, Parser};
use colored::Colorize;
use std::path::Path;
use tracing::{debug, error};
use warden_config::domains::logging::LogLevel;
use warden_config::{ConfigLoader, WardenConfig};
use warden_logging::{init_logging_from_config, init_simple_tracing, worker_log_file, LoggingGuard};
use warden_ports::PortRegistryError;
use warden_supervisor::SupervisorError;

use cli::{Cli, Commands};
use commands::Context;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".bright_red().bold(), e);
            exit_code(&e)
        }
    };

    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<i32> {
    let config = load_config(cli.config.as_deref())?;
    let ctx = Context::new(config, cli.config.clone(), cli.log_level.clone());

    // Worker mode has no terminal; everything goes to its log file
    if cli.worker {
        let service_id = cli
            .worker_service
            .clone()
            .unwrap_or_else(|| ctx.config.ports.service_id.clone());
        let log_file = worker_log_file(&ctx.supervisor_options(&service_id)?.state_dir, &service_id);
        let _guard = init_logging(&ctx, Some(log_file))?;

        return worker::run_worker(&ctx, &service_id).await.inspect_err(|e| {
            error!("Worker {} failed: {:#}", service_id, e);
        });
    }

    let _guard = init_logging(&ctx, None)?;
    debug!("Warden CLI starting");

    match cli.command {
        Some(Commands::PortRegistry(flags)) => commands::port_registry::run(&ctx, flags).await?,
        Some(Commands::AssignPort { task, start_from }) => {
            commands::assign::run(&ctx, &task, start_from).await?
        }
        Some(Commands::Info) => commands::info::run(&ctx).await?,
        None => {
            Cli::command().print_help()?;
            println!();
        }
    }

    Ok(0)
}

fn load_config(path: Option<&Path>) -> Result<WardenConfig> {
    ConfigLoader::new()
        .load(path)
        .with_context(|| match path {
            Some(path) => format!("Failed to load configuration from {:?}", path),
            None => "Failed to load configuration from environment".to_string(),
        })
}

/// Initialize logging from configuration with fallback to simple tracing
fn init_logging(ctx: &Context, file: Option<std::path::PathBuf>) -> Result<LoggingGuard> {
    let mut logging = ctx.config.logging.clone();

    // CLI log level wins over the environment and the config file
    if let Some(level) = ctx.log_level.as_deref() {
        match level.parse::<LogLevel>() {
            Ok(level) => logging.level = level,
            Err(e) => eprintln!("Ignoring --log-level: {}", e),
        }
    }
    if file.is_some() {
        logging.file = file;
    }

    match init_logging_from_config(&logging) {
        Ok(guard) => {
            debug!("Logging initialized at {}", logging.level);
            Ok(guard)
        }
        Err(e) => {
            eprintln!(
                "Failed to initialize structured logging: {:#}, falling back to simple tracing",
                e
            );
            init_simple_tracing(&logging.level.to_string())?;
            Ok(LoggingGuard::default())
        }
    }
}

fn exit_code(error: &anyhow::Error) -> i32 {
    let supervisor_error = error.downcast_ref::<SupervisorError>().or_else(|| {
        match error.downcast_ref::<PortRegistryError>() {
            Some(PortRegistryError::Supervisor(e)) => Some(e),
            _ => None,
        }
    });

    supervisor_error.map_or(1, SupervisorError::exit_code)
}
