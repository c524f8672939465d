//! Spotter - command-line driver for the gym resource cache.
//!
//! Loads configuration, wires the resource registry to the live API, and
//! runs one command against a fresh cache, printing the diagnostics
//! snapshot at the end.

mod args;
mod commands;

use std::io;
use std::path::Path;

use anyhow::Result;
use spotter_core::{Config, ResourceCache};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use args::Command;

/// Log file name prefix inside the configured log directory
const LOG_FILE_PREFIX: &str = "spotter.log";

/// Initialize the tracing subscriber for logging.
/// The returned guard must stay alive for the file writer to flush.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let argv: Vec<String> = std::env::args().skip(1).collect();
    let cli = args::parse(&argv)?;
    if cli.command == Command::Help {
        println!("{}", args::USAGE);
        return Ok(());
    }

    let mut config = match cli.config_path {
        Some(ref path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    config.apply_env();

    let _log_guard = init_tracing(config.log_dir.as_deref());
    info!(api = %config.api_base_url, "Spotter starting");

    if cli.command == Command::Resources {
        commands::resources(&config);
        return Ok(());
    }

    let api = config.api_client()?;
    let cache = ResourceCache::new(config.registry(&api), config.cache.settings());
    let shutdown = CancellationToken::new();
    let sweeper = cache.spawn_sweeper(shutdown.clone());

    let result = match cli.command {
        Command::Fetch { ref keys, callers } => commands::fetch(&cache, keys, callers).await,
        Command::Warm => commands::warm(&cache).await,
        Command::Resources | Command::Help => Ok(()),
    };

    shutdown.cancel();
    if let Err(e) = sweeper.await {
        error!(error = %e, "Cache sweeper task failed");
    }
    info!("Spotter shutting down");
    result
}
