//! Tests for the reap loop
//!
//! `wait` collects any child of the process, so everything that spawns lives in one
//! sequential test in this binary.

use entrypoint::command::{CommandRunner, CommandSpec, DetachedOutput};
use entrypoint::supervisor::{pause_forever, ProcessRegistry, Supervisor};
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::WaitStatus;
use nix::unistd::Pid;
use std::time::Duration;

#[test]
fn test_registry_tracks_processes_by_pid() {
    let mut registry = ProcessRegistry::default();
    registry.register("postgres", 100);
    registry.register("hub", 200);

    assert_eq!(registry.len(), 2);
    assert_eq!(registry.find("hub").unwrap().pid, 200);
    assert_eq!(
        registry.iter().map(|p| p.pid).collect::<Vec<_>>(),
        vec![100, 200]
    );

    assert_eq!(registry.remove(100).unwrap().name, "postgres");
    assert!(registry.remove(100).is_none());
    assert!(registry.find("postgres").is_none());
}

#[tokio::test]
async fn test_reap_loop() {
    let dir = tempfile::tempdir().unwrap();
    let mut runner = CommandRunner::new(true);

    let exits = runner
        .spawn_detached(
            "short-lived",
            &CommandSpec::shell("exit 7"),
            None,
            &DetachedOutput::Combined(dir.path().join("exits.log")),
        )
        .unwrap();
    let mut supervisor = Supervisor::new(runner.into_registry(), Duration::from_millis(20));

    let event = supervisor.reap_next().await.unwrap().unwrap();
    assert_eq!(event.pid, exits as i32);
    assert_eq!(event.status, WaitStatus::Exited(Pid::from_raw(exits as i32), 7));
    assert_eq!(event.process.as_ref().unwrap().name, "short-lived");
    assert!(event.describe().contains("short-lived"));
    assert!(supervisor.registry().is_empty());

    // children the entrypoint never registered are reaped too
    let orphan = std::process::Command::new("sleep").arg("5").spawn().unwrap();
    let orphan_pid = orphan.id() as i32;
    kill(Pid::from_raw(orphan_pid), Signal::SIGTERM).unwrap();
    let event = supervisor.reap_next().await.unwrap().unwrap();
    assert_eq!(event.pid, orphan_pid);
    assert!(event.process.is_none());
    assert!(matches!(event.status, WaitStatus::Signaled(_, Signal::SIGTERM, _)));

    // nothing left: reap_next reports it instead of blocking
    assert!(supervisor.reap_next().await.unwrap().is_none());

    // and the loop itself keeps going rather than returning
    let looped = tokio::time::timeout(Duration::from_millis(200), supervisor.run()).await;
    assert!(looped.is_err());
}

#[tokio::test]
async fn test_pause_forever_never_completes() {
    let paused = tokio::time::timeout(
        Duration::from_millis(100),
        pause_forever(Duration::from_millis(10)),
    )
    .await;
    assert!(paused.is_err());
}

#[tokio::test]
async fn test_interrupted_wait_is_retried_without_pausing() {
    use nix::errno::Errno;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    let mut registry = ProcessRegistry::default();
    registry.register("hub", 4242);
    let mut supervisor = Supervisor::new(registry, Duration::from_secs(3600));

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let wait_fn = move || match counter.fetch_add(1, Ordering::SeqCst) {
        0 | 1 => Err(Errno::EINTR),
        _ => Ok(WaitStatus::Exited(Pid::from_raw(4242), 0)),
    };

    let event = tokio::time::timeout(Duration::from_secs(5), supervisor.reap_next_with(wait_fn))
        .await
        .expect("interrupted wait was not retried promptly")
        .unwrap()
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(event.pid, 4242);
    assert_eq!(event.process.unwrap().name, "hub");
    assert!(supervisor.registry().is_empty());
}

#[tokio::test]
async fn test_unexpected_wait_error_is_returned() {
    use nix::errno::Errno;

    let mut supervisor = Supervisor::new(ProcessRegistry::default(), Duration::from_secs(3600));
    let err = supervisor
        .reap_next_with(|| Err(Errno::EINVAL))
        .await
        .unwrap_err();
    assert!(
        matches!(err, entrypoint::BootstrapError::Sys(Errno::EINVAL)),
        "{:?}",
        err
    );
}
