//! Best-effort reset of persisted project state.
use crate::command::{CommandRunner, CommandSpec, RunOptions};
use crate::config::StateResetConfig;

/// Mark every project as opened (not running).
///
/// Returns whether the statement went through. Failure is expected on a fresh
/// bootstrap while the database is still starting and is never fatal.
pub async fn reset_project_state(runner: &CommandRunner, config: &StateResetConfig) -> bool {
    tracing::info!(
        "[StateReset] reset_project_state: ensuring all projects are set as opened (not running) in the database"
    );
    let command = CommandSpec::argv([config.psql.as_str(), "-t"]);
    let options = RunOptions::default().with_input(format!("{}\n", config.statement));
    match runner.run_with(&command, options).await {
        Ok(_) => true,
        Err(e) => {
            tracing::warn!("[StateReset] reset_project_state failed (non-fatal): {}", e);
            false
        }
    }
}
