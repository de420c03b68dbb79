//! Reap loop keeping the container alive, and the registry of detached processes.
use crate::error::{BootstrapError, Result};
use nix::errno::Errno;
use nix::sys::wait::{wait, WaitStatus};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::time::Duration;

/// A process launched in the background by the entrypoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetachedProcess {
    pub name: String,
    pub pid: u32,
}

/// Detached processes still believed to be running, keyed by pid.
///
/// No wait handle is kept; children are only ever collected by the reap loop.
#[derive(Debug, Default)]
pub struct ProcessRegistry {
    processes: BTreeMap<u32, DetachedProcess>,
}

impl ProcessRegistry {
    pub fn register(&mut self, name: &str, pid: u32) {
        self.processes.insert(
            pid,
            DetachedProcess {
                name: name.to_string(),
                pid,
            },
        );
    }

    /// Forget a reaped process, returning it if it was ours.
    pub fn remove(&mut self, pid: u32) -> Option<DetachedProcess> {
        self.processes.remove(&pid)
    }

    pub fn find(&self, name: &str) -> Option<&DetachedProcess> {
        self.processes.values().find(|p| p.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DetachedProcess> {
        self.processes.values()
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }
}

/// One collected child
#[derive(Debug, Clone)]
pub struct ReapEvent {
    pub pid: i32,
    pub status: WaitStatus,
    /// Registry entry, `None` for orphans the entrypoint never launched
    pub process: Option<DetachedProcess>,
}

impl ReapEvent {
    pub fn describe(&self) -> String {
        let who = match &self.process {
            Some(p) => format!("{} (pid {})", p.name, self.pid),
            None => format!("pid {}", self.pid),
        };
        match self.status {
            WaitStatus::Exited(_, code) => format!("{} exited with code {}", who, code),
            WaitStatus::Signaled(_, signal, _) => format!("{} killed by {}", who, signal),
            other => format!("{} changed state: {:?}", who, other),
        }
    }
}

pub struct Supervisor {
    registry: ProcessRegistry,
    idle_interval: Duration,
}

impl Supervisor {
    pub fn new(registry: ProcessRegistry, idle_interval: Duration) -> Self {
        Self {
            registry,
            idle_interval,
        }
    }

    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    /// Block until any child exits. `Ok(None)` when there are no children at all.
    pub async fn reap_next(&mut self) -> Result<Option<ReapEvent>> {
        self.reap_next_with(wait).await
    }

    /// `reap_next` with the blocking wait call supplied by the caller.
    ///
    /// An interrupted wait is retried immediately.
    pub async fn reap_next_with<F>(&mut self, wait_fn: F) -> Result<Option<ReapEvent>>
    where
        F: Fn() -> nix::Result<WaitStatus> + Clone + Send + 'static,
    {
        loop {
            let status = tokio::task::spawn_blocking(wait_fn.clone())
                .await
                .map_err(|e| BootstrapError::Io(std::io::Error::other(e)))?;

            match status {
                Ok(status) => {
                    let pid = status.pid().map(|p| p.as_raw()).unwrap_or(-1);
                    let process = u32::try_from(pid)
                        .ok()
                        .and_then(|pid| self.registry.remove(pid));
                    return Ok(Some(ReapEvent {
                        pid,
                        status,
                        process,
                    }));
                }
                Err(Errno::EINTR) => {
                    tracing::debug!("[Supervisor] wait interrupted, retrying");
                }
                Err(Errno::ECHILD) => return Ok(None),
                Err(e) => return Err(BootstrapError::Sys(e)),
            }
        }
    }

    /// Reap children forever. Never returns.
    pub async fn run(mut self) -> Infallible {
        for process in self.registry.iter() {
            tracing::info!("[Supervisor] supervising {} (pid {})", process.name, process.pid);
        }
        loop {
            tracing::info!("[Supervisor] waiting for all subprocesses to complete...");
            match self.reap_next().await {
                Ok(Some(event)) => {
                    tracing::info!("[Supervisor] reaped {}", event.describe());
                }
                Ok(None) => {
                    tracing::debug!(
                        "[Supervisor] no children, sleeping {}s",
                        self.idle_interval.as_secs()
                    );
                    tokio::time::sleep(self.idle_interval).await;
                }
                Err(e) => {
                    tracing::error!("[Supervisor] wait failed: {}", e);
                    tokio::time::sleep(self.idle_interval).await;
                }
            }
        }
    }
}

/// Keep the container alive after a failed start so it can be inspected.
pub async fn pause_forever(interval: Duration) -> Infallible {
    tracing::warn!("Pausing indefinitely so you can try to debug this...");
    loop {
        tokio::time::sleep(interval).await;
    }
}
