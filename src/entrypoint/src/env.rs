//! Process-wide environment applied before any provisioning step runs.
use crate::config::EntrypointConfig;
use nix::sys::stat::{umask, Mode};

/// Mask applied to every file created by this process and its children
pub const UMASK: u32 = 0o077;

/// Connection defaults exported to children; only set when absent so a remote
/// database can be selected from outside the container.
pub fn connection_defaults(config: &EntrypointConfig) -> [(&'static str, String); 2] {
    [
        (
            "PGHOST",
            config.database.socket_dir().to_string_lossy().to_string(),
        ),
        ("PGUSER", config.database.superuser.clone()),
    ]
}

/// Set `PGHOST`/`PGUSER` defaults and lower the umask.
///
/// Must run while the process is still single-threaded, before the async runtime starts.
pub fn apply(config: &EntrypointConfig) {
    for (key, value) in connection_defaults(config) {
        match std::env::var_os(key) {
            Some(existing) => {
                tracing::info!("[Environment] {} already set to {:?}", key, existing);
            }
            None => {
                tracing::debug!("[Environment] {}={}", key, value);
                std::env::set_var(key, value);
            }
        }
    }

    let previous = umask(Mode::from_bits_truncate(UMASK as nix::libc::mode_t));
    tracing::debug!(
        "[Environment] umask {:03o} (was {:03o})",
        UMASK,
        previous.bits()
    );
}
