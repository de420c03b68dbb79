//! Entrypoint configuration
//! Loaded from entrypoint.toml; every field defaults to the container's fixed layout.
use crate::error::BootstrapError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Subject used for the self-signed certificate
pub const DEFAULT_CERT_SUBJECT: &str = "/C=US/ST=WA/L=WA/O=Network/OU=IT Department/CN=cocalc";

/// Process pattern matched by the stale-server kill
pub const DEFAULT_SERVER_PATTERN: &str = "cocalc-hub-server";

/// Statement run by the state reset
pub const RESET_PROJECT_STATE_SQL: &str = r#"update projects set state='{"state":"opened"}';"#;

/// System-wide config file location
pub const SYSTEM_CONFIG_PATH: &str = "/etc/cocalc/entrypoint.toml";

/// Entrypoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntrypointConfig {
    /// Log each command's duration
    #[serde(default = "default_true")]
    pub verbose: bool,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub certificate: CertificateConfig,

    #[serde(default)]
    pub ssh: SshConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub state_reset: StateResetConfig,

    #[serde(default)]
    pub supervisor: SupervisorConfig,
}

impl Default for EntrypointConfig {
    fn default() -> Self {
        Self {
            verbose: true,
            paths: PathsConfig::default(),
            certificate: CertificateConfig::default(),
            ssh: SshConfig::default(),
            database: DatabaseConfig::default(),
            server: ServerConfig::default(),
            state_reset: StateResetConfig::default(),
            supervisor: SupervisorConfig::default(),
        }
    }
}

impl EntrypointConfig {
    /// Load configuration from file
    ///
    /// Tries the explicit path first (which must exist), then `entrypoint.toml` in the
    /// working directory, then the system-wide location. Falls back to defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, BootstrapError> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        let config_paths = [
            PathBuf::from("entrypoint.toml"),
            PathBuf::from(SYSTEM_CONFIG_PATH),
        ];

        for path in config_paths {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        tracing::warn!("No entrypoint.toml found, using defaults");
        Ok(Self::default())
    }

    /// Parse a single config file
    pub fn from_file(path: &Path) -> Result<Self, BootstrapError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BootstrapError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        let config = Self::from_toml(&content).map_err(|e| {
            BootstrapError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;
        tracing::info!("Loaded entrypoint config from {:?}", path);
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

/// Persistent storage layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Persistent storage root, world-traversable
    #[serde(default = "default_storage_root")]
    pub storage_root: PathBuf,

    /// Owner-only subdirectories of the storage root, created when missing
    #[serde(default = "default_private_dirs")]
    pub private_dirs: Vec<String>,
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("/projects")
}

fn default_private_dirs() -> Vec<String> {
    vec!["conf".to_string()]
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            storage_root: default_storage_root(),
            private_dirs: default_private_dirs(),
        }
    }
}

/// Self-signed certificate settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateConfig {
    /// Configuration root locked down after generation
    #[serde(default = "default_conf_root")]
    pub conf_root: PathBuf,

    /// Directory holding key.pem and cert.pem
    #[serde(default = "default_cert_dir")]
    pub cert_dir: PathBuf,

    #[serde(default = "default_openssl")]
    pub openssl: String,

    #[serde(default = "default_cert_subject")]
    pub subject: String,
}

fn default_conf_root() -> PathBuf {
    PathBuf::from("/projects/conf")
}

fn default_cert_dir() -> PathBuf {
    PathBuf::from("/projects/conf/cert")
}

fn default_openssl() -> String {
    "openssl".to_string()
}

fn default_cert_subject() -> String {
    DEFAULT_CERT_SUBJECT.to_string()
}

impl Default for CertificateConfig {
    fn default() -> Self {
        Self {
            conf_root: default_conf_root(),
            cert_dir: default_cert_dir(),
            openssl: default_openssl(),
            subject: default_cert_subject(),
        }
    }
}

impl CertificateConfig {
    pub fn key_path(&self) -> PathBuf {
        self.cert_dir.join("key.pem")
    }

    pub fn cert_path(&self) -> PathBuf {
        self.cert_dir.join("cert.pem")
    }
}

/// SSH host key and daemon settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshConfig {
    /// Directory wiped and regenerated on every start
    #[serde(default = "default_ssh_dir")]
    pub ssh_dir: PathBuf,

    #[serde(default = "default_ssh_keygen")]
    pub keygen: String,

    /// Command starting the SSH service
    #[serde(default = "default_ssh_start")]
    pub start_command: Vec<String>,
}

fn default_ssh_dir() -> PathBuf {
    PathBuf::from("/root/.ssh")
}

fn default_ssh_keygen() -> String {
    "ssh-keygen".to_string()
}

fn default_ssh_start() -> Vec<String> {
    vec!["service".to_string(), "ssh".to_string(), "start".to_string()]
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            ssh_dir: default_ssh_dir(),
            keygen: default_ssh_keygen(),
            start_command: default_ssh_start(),
        }
    }
}

impl SshConfig {
    pub fn private_key_path(&self) -> PathBuf {
        self.ssh_dir.join("id_ecdsa")
    }

    pub fn public_key_path(&self) -> PathBuf {
        self.ssh_dir.join("id_ecdsa.pub")
    }

    pub fn authorized_keys_path(&self) -> PathBuf {
        self.ssh_dir.join("authorized_keys")
    }
}

/// Embedded PostgreSQL settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Root re-permissioned on every start
    #[serde(default = "default_db_root")]
    pub root: PathBuf,

    #[serde(default = "default_db_data_dir")]
    pub data_dir: PathBuf,

    /// Directory holding pg_ctl, postgres and createuser
    #[serde(default = "default_db_bin_dir")]
    pub bin_dir: PathBuf,

    /// Account owning the database root; `None` leaves ownership alone
    #[serde(default = "default_service_account")]
    pub service_account: Option<String>,

    /// Account the database tools run as (through sudo); `None` runs them directly
    #[serde(default = "default_service_account")]
    pub run_as: Option<String>,

    #[serde(default = "default_sudo")]
    pub sudo: String,

    /// Superuser role created on first run
    #[serde(default = "default_superuser")]
    pub superuser: String,

    /// Log of the long-lived server
    #[serde(default = "default_db_log")]
    pub log_file: PathBuf,

    #[serde(default = "default_startup_delay_secs")]
    pub startup_delay_secs: u64,

    #[serde(default = "default_shutdown_delay_secs")]
    pub shutdown_delay_secs: u64,
}

fn default_db_root() -> PathBuf {
    PathBuf::from("/projects/postgres")
}

fn default_db_data_dir() -> PathBuf {
    PathBuf::from("/projects/postgres/data")
}

fn default_db_bin_dir() -> PathBuf {
    PathBuf::from("/usr/lib/postgresql/10/bin")
}

fn default_service_account() -> Option<String> {
    Some("sage".to_string())
}

fn default_sudo() -> String {
    "sudo".to_string()
}

fn default_superuser() -> String {
    "smc".to_string()
}

fn default_db_log() -> PathBuf {
    PathBuf::from("/var/log/postgres.log")
}

fn default_startup_delay_secs() -> u64 {
    5
}

fn default_shutdown_delay_secs() -> u64 {
    3
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            root: default_db_root(),
            data_dir: default_db_data_dir(),
            bin_dir: default_db_bin_dir(),
            service_account: default_service_account(),
            run_as: default_service_account(),
            sudo: default_sudo(),
            superuser: default_superuser(),
            log_file: default_db_log(),
            startup_delay_secs: default_startup_delay_secs(),
            shutdown_delay_secs: default_shutdown_delay_secs(),
        }
    }
}

impl DatabaseConfig {
    pub fn socket_dir(&self) -> PathBuf {
        self.data_dir.join("socket")
    }

    pub fn hba_conf(&self) -> PathBuf {
        self.data_dir.join("pg_hba.conf")
    }

    pub fn postgresql_conf(&self) -> PathBuf {
        self.data_dir.join("postgresql.conf")
    }

    pub fn pid_file(&self) -> PathBuf {
        self.data_dir.join("postmaster.pid")
    }

    /// Log of the temporary bootstrap server
    pub fn bootstrap_log_file(&self) -> PathBuf {
        self.data_dir.join("postgres.log")
    }

    pub fn tool(&self, name: &str) -> PathBuf {
        self.bin_dir.join(name)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_secs(self.startup_delay_secs)
    }

    pub fn shutdown_delay(&self) -> Duration {
        Duration::from_secs(self.shutdown_delay_secs)
    }
}

/// Application server (hub) settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Pattern passed to the kill-by-name utility
    #[serde(default = "default_server_pattern")]
    pub process_pattern: String,

    #[serde(default = "default_pkill")]
    pub pkill: String,

    #[serde(default = "default_server_dir")]
    pub working_dir: PathBuf,

    #[serde(default = "default_server_command")]
    pub command: Vec<String>,

    #[serde(default = "default_server_log_dir")]
    pub log_dir: PathBuf,
}

fn default_server_pattern() -> String {
    DEFAULT_SERVER_PATTERN.to_string()
}

fn default_pkill() -> String {
    "pkill".to_string()
}

fn default_server_dir() -> PathBuf {
    PathBuf::from("/cocalc/src/packages/hub")
}

fn default_server_command() -> Vec<String> {
    vec![
        "pnpm".to_string(),
        "run".to_string(),
        "hub-docker-prod".to_string(),
    ]
}

fn default_server_log_dir() -> PathBuf {
    PathBuf::from("/var/log/hub")
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            process_pattern: default_server_pattern(),
            pkill: default_pkill(),
            working_dir: default_server_dir(),
            command: default_server_command(),
            log_dir: default_server_log_dir(),
        }
    }
}

impl ServerConfig {
    pub fn stdout_log(&self) -> PathBuf {
        self.log_dir.join("out")
    }

    pub fn stderr_log(&self) -> PathBuf {
        self.log_dir.join("err")
    }
}

/// Project state reset settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateResetConfig {
    #[serde(default = "default_psql")]
    pub psql: String,

    #[serde(default = "default_reset_sql")]
    pub statement: String,
}

fn default_psql() -> String {
    "psql".to_string()
}

fn default_reset_sql() -> String {
    RESET_PROJECT_STATE_SQL.to_string()
}

impl Default for StateResetConfig {
    fn default() -> Self {
        Self {
            psql: default_psql(),
            statement: default_reset_sql(),
        }
    }
}

/// Reap loop and failure pause settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Sleep between ticks of the failure pause, and when there are no children to reap
    #[serde(default = "default_pause_secs")]
    pub pause_secs: u64,
}

fn default_pause_secs() -> u64 {
    60
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            pause_secs: default_pause_secs(),
        }
    }
}

impl SupervisorConfig {
    pub fn pause_interval(&self) -> Duration {
        Duration::from_secs(self.pause_secs)
    }
}

fn default_true() -> bool {
    true
}
