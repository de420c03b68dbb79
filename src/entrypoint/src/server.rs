//! Application server (hub) launcher.
use crate::command::{CommandRunner, CommandSpec, DetachedOutput};
use crate::config::ServerConfig;
use crate::error::Result;

/// Registry name of the hub process
pub const SERVER_PROCESS: &str = "hub";

/// Kill any stale hub and launch a fresh one in the background. Returns its pid.
pub async fn start_server(runner: &mut CommandRunner, config: &ServerConfig) -> Result<u32> {
    tracing::info!("[Server] start_hub");
    kill_matching(runner, &config.pkill, &config.process_pattern).await;

    std::fs::create_dir_all(&config.log_dir)?;
    runner.spawn_detached(
        SERVER_PROCESS,
        &CommandSpec::Argv(config.command.clone()),
        Some(&config.working_dir),
        &DetachedOutput::Split {
            stdout: config.stdout_log(),
            stderr: config.stderr_log(),
        },
    )
}

/// `pkill -f <pattern>`; every failure, including "no such process", is ignored.
pub async fn kill_matching(runner: &CommandRunner, pkill: &str, pattern: &str) {
    let command = CommandSpec::argv([pkill, "-f", pattern]);
    if let Err(e) = runner.run(&command).await {
        tracing::debug!("[Server] ignoring kill failure: {}", e);
    }
}
