//! `warden info`

use anyhow::Result;
use colored::Colorize;
use warden_ipc::ControlProtocol;

use super::Context;

pub async fn run(ctx: &Context) -> Result<()> {
    let supervisor = ctx.registry_supervisor()?;
    let retries = supervisor.options().health_check_retries;

    let connection = match supervisor.connection() {
        Some(_) if supervisor.is_healthy(retries).await => supervisor.connection(),
        _ => None,
    };
    let Some(connection) = connection else {
        println!("{} is {}", supervisor.service_id(), "not running".bright_red());
        return Ok(());
    };

    println!("{}", connection.info().await?);
    Ok(())
}
