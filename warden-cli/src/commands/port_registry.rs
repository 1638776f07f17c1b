//! `warden port-registry`

use anyhow::{anyhow, Result};
use colored::Colorize;
use tracing::{error, info};
use warden_runtime::{InfoScreen, RunningWorker, RuntimeEvent};
use warden_supervisor::{StartOutcome, WorkerSupervisor};

use super::Context;
use crate::cli::{WorkerAction, WorkerFlags};

pub async fn run(ctx: &Context, flags: WorkerFlags) -> Result<()> {
    let supervisor = ctx.registry_supervisor()?;

    match flags.action() {
        WorkerAction::Kill => {
            supervisor.kill(false).await;
            println!("{} {}", "Killed".bright_yellow(), supervisor.service_id());
        }
        WorkerAction::Restart => {
            let descriptor = supervisor.restart().await?;
            println!("{} {}", "Restarted".bright_green(), descriptor);
        }
        WorkerAction::Detached => match supervisor.start_detached_if_needs_to_be_started().await? {
            StartOutcome::AlreadyRunning(descriptor) => {
                println!("{} {}", "Already running:".bright_cyan(), descriptor)
            }
            StartOutcome::Started(descriptor) => {
                println!("{} {}", "Started".bright_green(), descriptor)
            }
        },
        WorkerAction::Foreground => run_in_process(ctx, &supervisor, true).await?,
        WorkerAction::Sync => run_in_process(ctx, &supervisor, false).await?,
    }

    Ok(())
}

async fn run_in_process(ctx: &Context, supervisor: &WorkerSupervisor, interactive: bool) -> Result<()> {
    let runtime = ctx.runtime(supervisor.service_id())?;
    let host = supervisor.options().host_options();

    let Some(mut worker) = supervisor
        .start_in_current_process_if_needed(runtime, host)
        .await?
    else {
        println!(
            "{} {}",
            "Already running:".bright_cyan(),
            supervisor.descriptor()
        );
        return Ok(());
    };

    let event = if interactive {
        let screen = InfoScreen::new(worker.service_id(), worker.info_url());
        tokio::select! {
            event = worker.next_event() => event,
            result = screen.run() => {
                result?;
                None
            }
        }
    } else {
        println!("{} {}", "Serving".bright_green(), worker.info_url());
        tokio::select! {
            event = worker.next_event() => event,
            _ = tokio::signal::ctrl_c() => None,
        }
    };

    stop(worker, event).await
}

async fn stop(worker: RunningWorker, event: Option<RuntimeEvent>) -> Result<()> {
    match event {
        Some(RuntimeEvent::Tampered { expected, found }) => {
            error!(
                "Descriptor of {} changed underneath it: expected {}, found {}",
                expected.service_id().unwrap_or("<unknown>"),
                expected,
                found
            );
            Err(anyhow!(
                "Another process took over {}, shutting down",
                worker.service_id()
            ))
        }
        Some(RuntimeEvent::KillRequested) => {
            info!("Kill requested for {}", worker.service_id());
            worker.shutdown().await?;
            Ok(())
        }
        None => {
            info!("Shutting down {}", worker.service_id());
            worker.shutdown().await?;
            Ok(())
        }
    }
}
