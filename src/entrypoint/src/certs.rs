//! Self-signed TLS certificate for the hub.
//!
//! The key/cert pair persists across restarts: it is generated only when one of the
//! two files is missing, and then both are replaced.
use crate::command::{CommandRunner, CommandSpec, RunOptions};
use crate::config::CertificateConfig;
use crate::error::Result;
use crate::paths::restrict_to_owner;

/// Ensure `key.pem` and `cert.pem` exist, generating a self-signed pair if needed.
pub async fn ensure_certificate(runner: &CommandRunner, config: &CertificateConfig) -> Result<()> {
    tracing::info!("[Certificate] self_signed_cert");
    if !config.cert_dir.exists() {
        std::fs::create_dir_all(&config.cert_dir)?;
    }

    let key = config.key_path();
    let cert = config.cert_path();
    if key.exists() && cert.exists() {
        tracing::info!("[Certificate] ssl key and cert exist, so doing nothing further");
        return Ok(());
    }

    tracing::info!(
        "[Certificate] create self_signed key={} and cert={}",
        key.display(),
        cert.display()
    );
    runner
        .run_with(
            &generate_command(config),
            RunOptions::default().in_dir(&config.cert_dir),
        )
        .await?;

    restrict_to_owner(&config.conf_root)?;
    Ok(())
}

fn generate_command(config: &CertificateConfig) -> CommandSpec {
    CommandSpec::argv([
        config.openssl.clone(),
        "req".to_string(),
        "-new".to_string(),
        "-x509".to_string(),
        "-nodes".to_string(),
        "-out".to_string(),
        config.cert_path().to_string_lossy().to_string(),
        "-keyout".to_string(),
        config.key_path().to_string_lossy().to_string(),
        "-subj".to_string(),
        config.subject.clone(),
    ])
}
