//! Embedded PostgreSQL provisioning.
//!
//! On first run the data directory is initialized, switched to trust auth over a
//! permission-restricted unix socket with TCP disabled, and a temporary server is
//! started just long enough to create the superuser role. Every run then starts the
//! long-lived server in the background.
use crate::command::{CommandRunner, CommandSpec, DetachedOutput};
use crate::config::DatabaseConfig;
use crate::error::{BootstrapError, Result};
use crate::paths::restrict_to_owner_recursive;
use nix::sys::signal::{kill, Signal};
use nix::unistd::{Pid, User};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

/// Registry name of the temporary first-run server
pub const BOOTSTRAP_PROCESS: &str = "postgres-bootstrap";
/// Registry name of the long-lived server
pub const DATABASE_PROCESS: &str = "postgres";

/// Host-based auth policy written on first run
pub const TRUST_LOCAL_HBA: &str = "local all all trust";

/// Whether `ensure_database` had to create the data directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseProvision {
    Initialized,
    Existing,
}

/// Ensure the data directory exists and start the server.
pub async fn ensure_database(
    runner: &mut CommandRunner,
    config: &DatabaseConfig,
) -> Result<DatabaseProvision> {
    tracing::info!("[Database] start_postgres");
    apply_permissions(config)?;

    let provision = if config.data_dir.exists() {
        DatabaseProvision::Existing
    } else {
        initialize(runner, config).await?;
        DatabaseProvision::Initialized
    };

    tracing::info!("[Database] starting the server");
    if let Some(parent) = config.log_file.parent() {
        fs::create_dir_all(parent)?;
    }
    runner.spawn_detached(
        DATABASE_PROCESS,
        &server_command(config),
        None,
        &DetachedOutput::Combined(config.log_file.clone()),
    )?;

    Ok(provision)
}

/// First-run setup: init, auth/socket configuration, superuser role.
async fn initialize(runner: &mut CommandRunner, config: &DatabaseConfig) -> Result<()> {
    let data_dir = config.data_dir.to_string_lossy().to_string();
    let socket_dir = config.socket_dir();
    tracing::info!("[Database] create data directory {}", data_dir);

    runner
        .run(&tool_command(config, "pg_ctl", ["init", "-D", data_dir.as_str()]))
        .await?;

    fs::write(config.hba_conf(), TRUST_LOCAL_HBA)?;
    let mut conf = OpenOptions::new()
        .append(true)
        .open(config.postgresql_conf())?;
    write!(
        conf,
        "\nunix_socket_directories = '{}'\nlisten_addresses=''\n",
        socket_dir.display()
    )?;
    drop(conf);

    fs::create_dir_all(&socket_dir)?;
    apply_permissions(config)?;

    runner.spawn_detached(
        BOOTSTRAP_PROCESS,
        &server_command(config),
        None,
        &DetachedOutput::Combined(config.bootstrap_log_file()),
    )?;
    // TODO: poll for the socket file instead of sleeping a fixed delay
    tokio::time::sleep(config.startup_delay()).await;

    let socket = socket_dir.to_string_lossy().to_string();
    runner
        .run(&tool_command(
            config,
            "createuser",
            ["-h", socket.as_str(), "-sE", config.superuser.as_str()],
        ))
        .await?;

    let pid = read_postmaster_pid(&config.pid_file())?;
    tracing::info!("[Database] stopping bootstrap server (pid {})", pid);
    kill(Pid::from_raw(pid), Signal::SIGTERM)
        .map_err(|source| BootstrapError::Signal { pid, source })?;
    tokio::time::sleep(config.shutdown_delay()).await;

    Ok(())
}

/// Make the database root owned by the service account and closed to group/other.
///
/// Runs on every start so permissions are re-asserted on existing data.
pub fn apply_permissions(config: &DatabaseConfig) -> Result<()> {
    tracing::info!(
        "[Database] postgres_perms: ensuring postgres directory perms are sufficiently restrictive"
    );
    fs::create_dir_all(&config.root)?;

    if let Some(account) = &config.service_account {
        let user = User::from_name(account)?
            .ok_or_else(|| BootstrapError::UnknownAccount(account.clone()))?;
        chown_recursive(&config.root, &user)?;
    }
    restrict_to_owner_recursive(&config.root)
}

fn chown_recursive(path: &Path, user: &User) -> Result<()> {
    let metadata = fs::symlink_metadata(path)?;
    if metadata.file_type().is_symlink() {
        return Ok(());
    }
    nix::unistd::chown(path, Some(user.uid), Some(user.gid))?;
    if metadata.is_dir() {
        for entry in fs::read_dir(path)? {
            chown_recursive(&entry?.path(), user)?;
        }
    }
    Ok(())
}

/// First whitespace-separated token of `postmaster.pid`.
pub fn read_postmaster_pid(path: &Path) -> Result<i32> {
    let invalid = |reason: &str| BootstrapError::PidFile {
        path: path.display().to_string(),
        reason: reason.to_string(),
    };
    let contents = fs::read_to_string(path)?;
    let token = contents
        .split_whitespace()
        .next()
        .ok_or_else(|| invalid("empty"))?;
    let pid: i32 = token.parse().map_err(|_| invalid("not a pid"))?;
    if pid <= 0 {
        return Err(invalid("not a pid"));
    }
    Ok(pid)
}

fn server_command(config: &DatabaseConfig) -> CommandSpec {
    let data_dir = config.data_dir.to_string_lossy().to_string();
    tool_command(config, "postgres", ["-D", data_dir.as_str()])
}

fn tool_command<'a>(
    config: &DatabaseConfig,
    tool: &str,
    args: impl IntoIterator<Item = &'a str>,
) -> CommandSpec {
    let mut argv = vec![config.tool(tool).to_string_lossy().to_string()];
    argv.extend(args.into_iter().map(str::to_string));
    CommandSpec::Argv(argv).run_as(&config.sudo, config.run_as.as_deref())
}
