//! Port registry end to end: supervisor-driven start, assignment over HTTP,
//! and the raw wire shapes other tools rely on

mod common;

use anyhow::Result;
use common::*;
use serde_json::{json, Value};
use std::time::Duration;
use warden_ports::{assign_port, PortRegistryClient};

#[tokio::test]
async fn test_assignment_is_stable_across_invocations() -> Result<()> {
    init_tracing();
    let state_dir = tempfile::tempdir()?;
    let opts = options(&state_dir, "1.0.0", 29000);
    let launcher = registry_launcher(&opts, 53_000);

    let first = supervisor(opts.clone(), launcher.clone());
    let web = assign_port(&first, "web", None).await?;

    let second = supervisor(opts, launcher.clone());
    assert_eq!(assign_port(&second, "web", None).await?, web);

    let api = assign_port(&second, "api", None).await?;
    assert_ne!(api, web);
    assert_eq!(launcher.launch_count(), 1);

    let assignments = PortRegistryClient::connect(&second)?.assignments().await?;
    assert_eq!(assignments.len(), 2);
    assert!(assignments.iter().all(|a| a.assigned));
    Ok(())
}

#[tokio::test]
async fn test_registry_wire_protocol() -> Result<()> {
    init_tracing();
    let state_dir = tempfile::tempdir()?;
    let opts = options(&state_dir, "1.0.0", 29100);
    let supervisor = supervisor(opts.clone(), registry_launcher(&opts, 53_100));
    let descriptor = supervisor
        .start_detached_if_needs_to_be_started()
        .await?
        .descriptor()
        .clone();

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .no_proxy()
        .build()?;
    let base = format!("http://127.0.0.1:{}", descriptor.port().expect("port"));

    let assigned: Value = http
        .post(format!("{}/ports/register-and-assign", base))
        .json(&json!({ "uniqueServiceName": "cache", "startFrom": 29900 }))
        .send()
        .await?
        .json()
        .await?;
    let port = assigned["port"].as_u64().expect("port in response");
    assert!(port >= 29900);

    let healthy: bool = http
        .post(format!("{}/control/is-healthy", base))
        .json(&descriptor)
        .send()
        .await?
        .json()
        .await?;
    assert!(healthy);

    let up_to_date: bool = http
        .post(format!("{}/control/has-up-to-date-version", base))
        .json(&json!({ "serviceID": SERVICE_ID, "version": "9.0.0" }))
        .send()
        .await?
        .json()
        .await?;
    assert!(!up_to_date);

    let info = http.get(format!("{}/info", base)).send().await?.text().await?;
    assert!(info.contains("Service: port-registry"));
    assert!(info.contains("Assigned ports: 1"));
    assert!(info.contains(&format!("cache -> {}", port)));

    let rejected = http
        .post(format!("{}/ports/register-and-assign", base))
        .json(&json!({ "uniqueServiceName": "" }))
        .send()
        .await?;
    assert_eq!(rejected.status(), reqwest::StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn test_restarted_registry_starts_with_empty_table() -> Result<()> {
    init_tracing();
    let state_dir = tempfile::tempdir()?;
    let opts = options(&state_dir, "1.0.0", 29200);
    let launcher = registry_launcher(&opts, 53_200);
    let supervisor = supervisor(opts, launcher.clone());

    assign_port(&supervisor, "web", None).await?;
    supervisor.restart().await?;

    let client = PortRegistryClient::connect(&supervisor)?;
    assert!(client.assignments().await?.is_empty());
    assert_eq!(launcher.launch_count(), 2);
    Ok(())
}
