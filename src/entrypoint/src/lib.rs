//! Container entrypoint
//!
//! Prepares persistent storage, a self-signed certificate, SSH host keys, the embedded
//! PostgreSQL instance and the hub, then stays in the foreground reaping children.
//! Every external program runs through [`CommandRunner`].

pub mod bootstrap;
pub mod certs;
pub mod command;
pub mod config;
pub mod database;
pub mod env;
pub mod error;
pub mod paths;
pub mod server;
pub mod ssh;
pub mod state;
pub mod supervisor;

pub use bootstrap::{Bootstrap, BootstrapReport, Step};
pub use command::{CommandRunner, CommandSpec, DetachedOutput, RunOptions};
pub use config::EntrypointConfig;
pub use database::DatabaseProvision;
pub use error::{BootstrapError, Result};
pub use ssh::HostKey;
pub use supervisor::{DetachedProcess, ProcessRegistry, ReapEvent, Supervisor};
