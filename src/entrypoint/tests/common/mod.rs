//! Shared fixtures: stand-ins for the external tools and a config pointing into a temp dir.
#![allow(dead_code)]

use entrypoint::config::EntrypointConfig;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

static FAKE_BIN: OnceLock<tempfile::TempDir> = OnceLock::new();

const RANDOM_HEX: &str = "od -An -tx1 -N16 /dev/urandom | tr -d ' \\n'";

/// Directory of fake tools. Written once, before any test spawns a process, so
/// no script is ever executed while a descriptor to it is still open for writing.
pub fn fake_bin() -> &'static Path {
    FAKE_BIN
        .get_or_init(|| {
            let dir = tempfile::tempdir().unwrap();
            for (name, body) in fake_tools() {
                let path = dir.path().join(name);
                fs::write(&path, body).unwrap();
                fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
            }
            dir
        })
        .path()
}

fn fake_tools() -> Vec<(&'static str, String)> {
    vec![
        (
            "openssl",
            format!(
                r#"#!/bin/sh
out=""; key=""
while [ $# -gt 0 ]; do
  case "$1" in
    -out) out="$2"; shift ;;
    -keyout) key="$2"; shift ;;
  esac
  shift
done
echo "cert $({hex})" > "$out"
echo "key $({hex})" > "$key"
"#,
                hex = RANDOM_HEX
            ),
        ),
        (
            "ssh-keygen",
            format!(
                r#"#!/bin/sh
file=""
while [ $# -gt 0 ]; do
  case "$1" in
    -f) file="$2"; shift ;;
  esac
  shift
done
echo "private $({hex})" > "$file"
echo "ecdsa-sha2-nistp256 $({hex}) root@test" > "$file.pub"
"#,
                hex = RANDOM_HEX
            ),
        ),
        (
            "pg_ctl",
            r#"#!/bin/sh
# pg_ctl init -D <dir>
[ "$1" = "init" ] || exit 2
mkdir -p "$3"
printf '# postgresql.conf\nmax_connections = 100\n' > "$3/postgresql.conf"
printf 'host all all 0.0.0.0/0 md5\n' > "$3/pg_hba.conf"
"#
            .to_string(),
        ),
        (
            "postgres",
            r#"#!/bin/sh
# postgres -D <dir>
printf '%s\n%s\n' "$$" "$2" > "$2/postmaster.pid"
echo "database system is ready to accept connections"
exec sleep 3
"#
            .to_string(),
        ),
        (
            "createuser",
            r#"#!/bin/sh
# createuser -h <socket> -sE <role>
echo "$@" >> "$2/../createuser.calls"
"#
            .to_string(),
        ),
        (
            "psql",
            r#"#!/bin/sh
grep -q "update projects set state" -
"#
            .to_string(),
        ),
        (
            "pkill",
            r#"#!/bin/sh
# no process matched
exit 1
"#
            .to_string(),
        ),
        (
            "hub",
            r#"#!/bin/sh
echo "hub listening"
echo "hub warning" >&2
exec sleep 2
"#
            .to_string(),
        ),
    ]
}

pub fn tool(name: &str) -> String {
    fake_bin().join(name).to_string_lossy().to_string()
}

pub fn current_user() -> String {
    nix::unistd::User::from_uid(nix::unistd::getuid())
        .unwrap()
        .expect("current user has a passwd entry")
        .name
}

/// Config with every path under `root` and every tool faked.
pub fn test_config(root: &Path) -> EntrypointConfig {
    let mut config = EntrypointConfig::default();
    let storage = root.join("projects");

    config.paths.storage_root = storage.clone();

    config.certificate.conf_root = storage.join("conf");
    config.certificate.cert_dir = storage.join("conf/cert");
    config.certificate.openssl = tool("openssl");

    config.ssh.ssh_dir = root.join("ssh");
    config.ssh.keygen = tool("ssh-keygen");
    config.ssh.start_command = vec![
        "touch".to_string(),
        root.join("ssh-started").to_string_lossy().to_string(),
    ];

    config.database.root = storage.join("postgres");
    config.database.data_dir = storage.join("postgres/data");
    config.database.bin_dir = fake_bin().to_path_buf();
    config.database.service_account = Some(current_user());
    config.database.run_as = None;
    config.database.log_file = root.join("log/postgres.log");
    config.database.startup_delay_secs = 1;
    config.database.shutdown_delay_secs = 0;

    config.server.pkill = tool("pkill");
    config.server.working_dir = root.to_path_buf();
    config.server.command = vec![tool("hub")];
    config.server.log_dir = root.join("log/hub");

    config.state_reset.psql = tool("psql");
    config.supervisor.pause_secs = 1;
    config
}

pub fn missing_tool(root: &Path, name: &str) -> String {
    root.join("missing").join(name).to_string_lossy().to_string()
}

/// Poll until `path` has non-empty contents.
pub async fn wait_for_contents(path: &Path) -> String {
    for _ in 0..50 {
        if let Ok(contents) = fs::read_to_string(path) {
            if !contents.is_empty() {
                return contents;
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("{} never got any contents", path.display());
}

pub fn mode(path: &Path) -> u32 {
    fs::metadata(path).unwrap().permissions().mode() & 0o777
}

pub fn read(path: impl AsRef<Path>) -> String {
    fs::read_to_string(path.as_ref())
        .unwrap_or_else(|e| panic!("reading {}: {}", path.as_ref().display(), e))
}
