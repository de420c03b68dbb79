//! Container entrypoint binary. Runs as the container's main process and never exits.
use anyhow::Context;
use clap::Parser;
use entrypoint::config::SupervisorConfig;
use entrypoint::supervisor::pause_forever;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "entrypoint", version, about = "Container entrypoint: provision services, then reap children")]
struct Args {
    #[arg(short = 'c', long = "config", help = "Config file (default: ./entrypoint.toml, then /etc/cocalc/entrypoint.toml)")]
    config: Option<PathBuf>,

    #[arg(long = "log-level", help = "Log filter used when RUST_LOG is not set", default_value = "info")]
    log_level: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    // a bad config is a failed start like any other: log it and keep the container up
    let config = match entrypoint::EntrypointConfig::load(args.config.as_deref()) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::error!("Failed to start - {}", e);
            None
        }
    };

    // still single-threaded: environment and umask are inherited by everything spawned later
    if let Some(config) = &config {
        entrypoint::env::apply(config);
    }

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    let never = match config {
        Some(config) => rt.block_on(entrypoint::bootstrap::run(config)),
        None => rt.block_on(pause_forever(SupervisorConfig::default().pause_interval())),
    };
    match never {}
}
