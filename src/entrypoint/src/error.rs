//! Error types for the entrypoint
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BootstrapError>;

#[derive(Debug, Error)]
pub enum BootstrapError {
    /// A command ran but exited non-zero (or was killed by a signal).
    #[error("error running '{command}' (exit code {code:?})")]
    CommandFailed { command: String, code: Option<i32> },

    /// A command could not be started at all, e.g. the program is missing.
    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid pid file {path}: {reason}")]
    PidFile { path: String, reason: String },

    #[error("Unknown account: {0}")]
    UnknownAccount(String),

    #[error("Failed to signal process {pid}: {source}")]
    Signal {
        pid: i32,
        #[source]
        source: nix::errno::Errno,
    },

    #[error("System call failed: {0}")]
    Sys(#[from] nix::errno::Errno),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BootstrapError {
    /// The command text carried by command failures, if any.
    pub fn command(&self) -> Option<&str> {
        match self {
            BootstrapError::CommandFailed { command, .. } | BootstrapError::Spawn { command, .. } => {
                Some(command)
            }
            _ => None,
        }
    }
}
