//! Hidden worker mode: what a detached launch runs

use anyhow::{Context as _, Result};
use tracing::{error, info};
use warden_runtime::{RuntimeEvent, WorkerHost};

use crate::commands::Context;

/// Exit code when another process overwrote this worker's descriptor
pub const TAMPERED_EXIT_CODE: i32 = 1;

/// Host `service_id` until killed. Returns the process exit code.
pub async fn run_worker(ctx: &Context, service_id: &str) -> Result<i32> {
    let options = ctx.supervisor_options(service_id)?;
    let runtime = ctx.runtime(service_id)?;

    let mut worker = WorkerHost::new(runtime, options.descriptor_store(), options.host_options())
        .start()
        .await
        .with_context(|| format!("Failed to start worker for {}", service_id))?;

    info!(
        "Worker {} (pid {}) listening on {}",
        service_id,
        worker.pid(),
        worker.address()
    );

    match worker.next_event().await {
        Some(RuntimeEvent::Tampered { expected, found }) => {
            error!(
                "Descriptor of {} no longer names this worker (expected {}, found {}), exiting",
                service_id, expected, found
            );
            Ok(TAMPERED_EXIT_CODE)
        }
        Some(RuntimeEvent::KillRequested) | None => {
            info!("Worker {} shutting down", service_id);
            worker.shutdown().await?;
            Ok(0)
        }
    }
}
