//! Bootstrap sequence: provisioning steps in dependency order, then supervision.
//!
//! Any step error aborts the remaining steps. The top level then logs it and pauses
//! forever instead of exiting, so the container stays up for inspection.
use crate::command::CommandRunner;
use crate::config::EntrypointConfig;
use crate::database::{self, DatabaseProvision};
use crate::error::Result;
use crate::ssh::{self, HostKey};
use crate::supervisor::{pause_forever, Supervisor};
use crate::{certs, paths, server, state};
use std::convert::Infallible;
use std::fmt;
use std::time::Instant;

/// Provisioning steps, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    StorageRoot,
    Certificate,
    Ssh,
    Database,
    Server,
    StateReset,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::StorageRoot => "storage-root",
            Step::Certificate => "certificate",
            Step::Ssh => "ssh",
            Step::Database => "database",
            Step::Server => "server",
            Step::StateReset => "state-reset",
        };
        f.write_str(name)
    }
}

/// What a completed provisioning pass did
#[derive(Debug, Default)]
pub struct BootstrapReport {
    /// Steps that finished, in order
    pub completed: Vec<Step>,
    pub host_key: Option<HostKey>,
    pub database: Option<DatabaseProvision>,
    pub server_pid: Option<u32>,
    pub state_reset: bool,
}

pub struct Bootstrap {
    config: EntrypointConfig,
    runner: CommandRunner,
}

impl Bootstrap {
    pub fn new(config: EntrypointConfig) -> Self {
        let runner = CommandRunner::new(config.verbose);
        Self { config, runner }
    }

    pub fn runner(&self) -> &CommandRunner {
        &self.runner
    }

    /// Run every provisioning step. Fail-fast: stops at the first fatal error.
    pub async fn provision(&mut self) -> Result<BootstrapReport> {
        let mut report = BootstrapReport::default();
        let started = Instant::now();

        let step_start = Instant::now();
        paths::init_storage_root(&self.config.paths)?;
        self.completed(&mut report, Step::StorageRoot, step_start);

        let step_start = Instant::now();
        certs::ensure_certificate(&self.runner, &self.config.certificate).await?;
        self.completed(&mut report, Step::Certificate, step_start);

        let step_start = Instant::now();
        report.host_key = Some(ssh::ensure_ssh(&self.runner, &self.config.ssh).await?);
        self.completed(&mut report, Step::Ssh, step_start);

        let step_start = Instant::now();
        report.database =
            Some(database::ensure_database(&mut self.runner, &self.config.database).await?);
        self.completed(&mut report, Step::Database, step_start);

        let step_start = Instant::now();
        report.server_pid = Some(server::start_server(&mut self.runner, &self.config.server).await?);
        self.completed(&mut report, Step::Server, step_start);

        let step_start = Instant::now();
        report.state_reset =
            state::reset_project_state(&self.runner, &self.config.state_reset).await;
        self.completed(&mut report, Step::StateReset, step_start);

        tracing::info!(
            "[Bootstrap] provisioning finished in {}ms ({} background processes)",
            started.elapsed().as_millis(),
            self.runner.registry().len()
        );
        Ok(report)
    }

    fn completed(&self, report: &mut BootstrapReport, step: Step, start: Instant) {
        tracing::info!(
            "[TIMING] Step {} completed in {}ms",
            step,
            start.elapsed().as_millis()
        );
        report.completed.push(step);
    }

    /// Hand the launched processes over to the reap loop.
    pub fn into_supervisor(self) -> Supervisor {
        let idle = self.config.supervisor.pause_interval();
        Supervisor::new(self.runner.into_registry(), idle)
    }
}

/// Provision everything, then reap children forever. Never returns.
pub async fn run(config: EntrypointConfig) -> Infallible {
    let pause = config.supervisor.pause_interval();
    let mut bootstrap = Bootstrap::new(config);
    match bootstrap.provision().await {
        Ok(report) => {
            tracing::info!(
                "[Bootstrap] started: {}",
                report
                    .completed
                    .iter()
                    .map(Step::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            bootstrap.into_supervisor().run().await
        }
        Err(e) => {
            tracing::error!("Failed to start - {}", e);
            pause_forever(pause).await
        }
    }
}
