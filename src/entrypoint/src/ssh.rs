//! SSH host keys and daemon.
//!
//! Keys are container-scoped: they are destroyed and regenerated on every start,
//! unlike the TLS certificate.
use crate::command::{CommandRunner, CommandSpec};
use crate::config::SshConfig;
use crate::error::Result;
use sha2::{Digest, Sha256};
use std::fs;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

/// Freshly generated key pair
#[derive(Debug, Clone)]
pub struct HostKey {
    pub private_key: PathBuf,
    pub public_key: PathBuf,
    /// `sha256:<hex>` digest of the public key file, not an OpenSSH fingerprint
    pub fingerprint: String,
}

/// Regenerate keys, then start the daemon.
pub async fn ensure_ssh(runner: &CommandRunner, config: &SshConfig) -> Result<HostKey> {
    let host_key = regenerate_host_keys(runner, config).await?;
    start_daemon(runner, config).await?;
    Ok(host_key)
}

/// Wipe the key directory and create a new ECDSA key trusted by itself.
pub async fn regenerate_host_keys(runner: &CommandRunner, config: &SshConfig) -> Result<HostKey> {
    tracing::info!("[Ssh] root_ssh_keys: creating them");

    match fs::remove_dir_all(&config.ssh_dir) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(&config.ssh_dir)?;

    let private_key = config.private_key_path();
    runner
        .run(&CommandSpec::argv([
            config.keygen.clone(),
            "-t".to_string(),
            "ecdsa".to_string(),
            "-N".to_string(),
            String::new(),
            "-f".to_string(),
            private_key.to_string_lossy().to_string(),
        ]))
        .await?;

    let public_key = config.public_key_path();
    let authorized_keys = config.authorized_keys_path();
    fs::copy(&public_key, &authorized_keys)?;
    tracing::info!(
        "[Ssh] '{}' -> '{}'",
        public_key.display(),
        authorized_keys.display()
    );

    let fingerprint = fingerprint(&public_key)?;
    tracing::info!("[Ssh] public key digest {}", fingerprint);

    Ok(HostKey {
        private_key,
        public_key,
        fingerprint,
    })
}

/// Start the SSH service through the service manager.
pub async fn start_daemon(runner: &CommandRunner, config: &SshConfig) -> Result<()> {
    tracing::info!("[Ssh] starting ssh");
    runner
        .run(&CommandSpec::Argv(config.start_command.clone()))
        .await
}

/// SHA-256 of the public key file contents, in `sha256:<hex>` digest form.
pub fn fingerprint(public_key: &Path) -> Result<String> {
    let contents = fs::read(public_key)?;
    let digest = Sha256::digest(&contents);
    Ok(format!("sha256:{:x}", digest))
}
