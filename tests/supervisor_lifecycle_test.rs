//! Start, attach, preempt, kill and restart across independent supervisors
//! sharing one state directory, the way separate CLI invocations do

mod common;

use anyhow::Result;
use common::*;
use warden_supervisor::{StartOutcome, WorkerState};

#[tokio::test]
async fn test_second_invocation_attaches_to_running_worker() -> Result<()> {
    init_tracing();
    let state_dir = tempfile::tempdir()?;
    let opts = options(&state_dir, "1.0.0", 28000);
    let launcher = registry_launcher(&opts, 50_000);

    let first = supervisor(opts.clone(), launcher.clone());
    let started = first.start_detached_if_needs_to_be_started().await?;
    assert!(matches!(started, StartOutcome::Started(_)));

    let second = supervisor(opts, launcher.clone());
    let attached = second.start_detached_if_needs_to_be_started().await?;
    assert_eq!(attached, StartOutcome::AlreadyRunning(started.descriptor().clone()));
    assert_eq!(launcher.launch_count(), 1);
    assert_eq!(second.state().await, WorkerState::Healthy);

    Ok(())
}

#[tokio::test]
async fn test_newer_invocation_preempts_older_worker() -> Result<()> {
    init_tracing();
    let state_dir = tempfile::tempdir()?;

    let old_opts = options(&state_dir, "1.0.0", 28100);
    let old_launcher = registry_launcher(&old_opts, 50_100);
    let old = supervisor(old_opts, old_launcher.clone());
    let old_worker = old.start_detached_if_needs_to_be_started().await?;

    let new_opts = options(&state_dir, "1.1.0", 28100);
    let new_launcher = registry_launcher(&new_opts, 51_100);
    let new = supervisor(new_opts, new_launcher.clone());

    // Seen from the newer binary, the running worker is stale
    assert_eq!(new.state().await, WorkerState::Stale);

    let outcome = new.start_detached_if_needs_to_be_started().await?;
    let StartOutcome::Started(replacement) = outcome else {
        panic!("expected the outdated worker to be replaced, got {:?}", outcome);
    };
    assert_eq!(replacement.version.as_deref(), Some("1.1.0"));
    assert_ne!(replacement.pid(), old_worker.descriptor().pid());
    assert_eq!(new_launcher.launch_count(), 1);

    assert!(eventually(|| old_launcher.live_workers() == 0).await);
    Ok(())
}

#[tokio::test]
async fn test_older_invocation_attaches_to_newer_worker() -> Result<()> {
    init_tracing();
    let state_dir = tempfile::tempdir()?;

    let new_opts = options(&state_dir, "2.0.0", 28200);
    let new = supervisor(new_opts.clone(), registry_launcher(&new_opts, 50_200));
    let running = new.start_detached_if_needs_to_be_started().await?;

    let old_opts = options(&state_dir, "1.9.3", 28200);
    let old_launcher = registry_launcher(&old_opts, 51_200);
    let old = supervisor(old_opts, old_launcher.clone());

    let outcome = old.start_detached_if_needs_to_be_started().await?;
    assert_eq!(outcome, StartOutcome::AlreadyRunning(running.descriptor().clone()));
    assert_eq!(old_launcher.launch_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_kill_keeping_breadcrumb_then_restart() -> Result<()> {
    init_tracing();
    let state_dir = tempfile::tempdir()?;
    let opts = options(&state_dir, "1.0.0", 28300);
    let launcher = registry_launcher(&opts, 50_300);
    let supervisor = supervisor(opts, launcher.clone());

    let first = supervisor.start_detached(5).await?;
    supervisor.kill(true).await;

    // Breadcrumb stays, but nothing answers behind it any more
    assert_eq!(supervisor.descriptor().pid(), first.pid());
    assert!(eventually(|| launcher.live_workers() == 0).await);
    assert!(!supervisor.is_healthy(2).await);

    let second = supervisor.restart().await?;
    assert_ne!(second.pid(), first.pid());
    assert_eq!(supervisor.state().await, WorkerState::Healthy);
    assert_eq!(launcher.live_workers(), 1);
    Ok(())
}

#[tokio::test]
async fn test_racing_invocations_converge_on_one_worker() -> Result<()> {
    init_tracing();
    let state_dir = tempfile::tempdir()?;
    let opts = options(&state_dir, "1.0.0", 28400);
    let launcher = registry_launcher(&opts, 50_400);

    let a = supervisor(opts.clone(), launcher.clone());
    let b = supervisor(opts, launcher.clone());

    let (from_a, from_b) = tokio::join!(
        a.start_detached_if_needs_to_be_started(),
        b.start_detached_if_needs_to_be_started()
    );
    from_a?;
    from_b?;

    // Whoever lost, both now agree on the recorded worker
    assert!(eventually(|| launcher.live_workers() == 1).await);
    assert!(a.is_healthy(3).await);
    assert!(b.is_healthy(3).await);
    assert_eq!(a.descriptor(), b.descriptor());
    assert!(!a.descriptor().is_starting());
    Ok(())
}

#[tokio::test]
async fn test_concurrent_launches_leave_one_live_worker() -> Result<()> {
    init_tracing();
    let state_dir = tempfile::tempdir()?;
    let opts = options(&state_dir, "1.0.0", 28450);
    let launcher = registry_launcher(&opts, 50_450);

    let a = supervisor(opts.clone(), launcher.clone());
    let b = supervisor(opts, launcher.clone());

    // Both launch without looking at the descriptor first, so the second
    // worker scans past the port the first one already holds
    let (from_a, from_b) = tokio::join!(a.start_detached(10), b.start_detached(10));
    from_a?;
    from_b?;

    assert_eq!(launcher.launch_count(), 2);
    assert!(eventually(|| launcher.live_workers() == 1).await);

    // The survivor is the worker the descriptor names
    assert!(a.is_healthy(3).await);
    assert!(b.is_healthy(3).await);
    assert_eq!(a.descriptor(), b.descriptor());
    assert!(!a.descriptor().is_starting());
    Ok(())
}
