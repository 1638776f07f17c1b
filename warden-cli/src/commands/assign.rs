//! `warden assign-port`

use anyhow::Result;
use warden_ports::assign_port;

use super::Context;

pub async fn run(ctx: &Context, task: &str, start_from: Option<u16>) -> Result<()> {
    let supervisor = ctx.registry_supervisor()?;
    let port = assign_port(&supervisor, task, start_from).await?;
    println!("{}", port);
    Ok(())
}
