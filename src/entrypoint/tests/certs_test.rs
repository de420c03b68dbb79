//! Tests for the self-signed certificate provisioner

mod common;

use entrypoint::certs::ensure_certificate;
use entrypoint::command::CommandRunner;
use entrypoint::error::BootstrapError;
use std::os::unix::fs::PermissionsExt;

#[tokio::test]
async fn test_generates_key_and_cert_on_first_run() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::test_config(dir.path()).certificate;
    let runner = CommandRunner::new(true);

    ensure_certificate(&runner, &config).await.unwrap();

    assert!(common::read(config.key_path()).starts_with("key "));
    assert!(common::read(config.cert_path()).starts_with("cert "));
}

#[tokio::test]
async fn test_second_run_leaves_pair_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::test_config(dir.path()).certificate;
    let runner = CommandRunner::new(true);

    ensure_certificate(&runner, &config).await.unwrap();
    let key = common::read(config.key_path());
    let cert = common::read(config.cert_path());

    ensure_certificate(&runner, &config).await.unwrap();
    assert_eq!(common::read(config.key_path()), key);
    assert_eq!(common::read(config.cert_path()), cert);
}

#[tokio::test]
async fn test_missing_half_regenerates_both() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::test_config(dir.path()).certificate;
    let runner = CommandRunner::new(true);

    ensure_certificate(&runner, &config).await.unwrap();
    let key = common::read(config.key_path());
    let cert = common::read(config.cert_path());
    std::fs::remove_file(config.cert_path()).unwrap();

    ensure_certificate(&runner, &config).await.unwrap();
    assert_ne!(common::read(config.key_path()), key);
    assert_ne!(common::read(config.cert_path()), cert);
}

#[tokio::test]
async fn test_conf_root_is_owner_only_after_generation() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::test_config(dir.path()).certificate;
    std::fs::create_dir_all(&config.conf_root).unwrap();
    std::fs::set_permissions(&config.conf_root, std::fs::Permissions::from_mode(0o755)).unwrap();
    let runner = CommandRunner::new(true);

    ensure_certificate(&runner, &config).await.unwrap();

    assert_eq!(common::mode(&config.conf_root) & 0o077, 0);
}

#[tokio::test]
async fn test_missing_generator_propagates_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = common::test_config(dir.path()).certificate;
    config.openssl = common::missing_tool(dir.path(), "openssl");
    let runner = CommandRunner::new(true);

    let err = ensure_certificate(&runner, &config).await.unwrap_err();

    assert!(matches!(err, BootstrapError::Spawn { .. }), "{:?}", err);
    assert!(config.cert_dir.exists());
    assert!(!config.key_path().exists());
    assert!(!config.cert_path().exists());
}

#[tokio::test]
async fn test_failing_generator_propagates_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = common::test_config(dir.path()).certificate;
    config.openssl = "false".to_string();
    let runner = CommandRunner::new(true);

    let err = ensure_certificate(&runner, &config).await.unwrap_err();

    assert!(matches!(err, BootstrapError::CommandFailed { .. }), "{:?}", err);
    assert!(err.command().unwrap().contains("IT Department"));
}
