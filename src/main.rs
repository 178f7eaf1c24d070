//! broker-server
//!
//! Runs the connection acceptance layer of the broker with an echo protocol
//! handler.
//!
//! # Architecture Overview
//!
//! ```text
//!   TCP clients ──▶ client listener ──┐
//!   cluster peers ─▶ route/gateway/   │      ┌──────────────┐
//!                    leaf listeners ──┼─────▶│ accept loops │──▶ connection workers
//!   in-process ───▶ named pipe ───────┘      └──────────────┘        │
//!   (HandoffQueue)                                                   ▼
//!                                                           connection registry
//!
//!   signals ──▶ shutdown / reload / lame duck
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use broker_server::config::loader::load_config_with;
use broker_server::config::validation::validate_config;
use broker_server::config::watcher::ConfigWatcher;
use broker_server::config::{ConfigError, Overrides, ServerConfig};
use broker_server::lifecycle::{signals, startup};
use broker_server::observability::{logging, metrics};
use broker_server::server::Echo;

#[derive(Parser)]
#[command(name = "broker-server")]
#[command(about = "Broker connection acceptance and graceful shutdown", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Client listener address, overriding the config file.
    #[arg(short, long)]
    listen: Option<String>,

    /// Disable the in-memory pipe.
    #[arg(long)]
    no_pipe: bool,

    /// Reload when the config file changes.
    #[arg(long, requires = "config")]
    watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Reapplied on every reload so the flags outlive the file.
    let overrides = Overrides {
        listen: cli.listen.clone(),
        no_pipe: cli.no_pipe,
    };
    let config = match &cli.config {
        Some(path) => load_config_with(path, &overrides)?,
        None => {
            let mut config = ServerConfig::default();
            overrides.apply(&mut config);
            validate_config(&config).map_err(ConfigError::Validation)?;
            config
        }
    };

    logging::init(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "broker-server starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let server = startup::start(config, Arc::new(Echo)).await?;

    // Kept alive for the life of the process.
    let _watcher = match (&cli.config, cli.watch) {
        (Some(path), true) => {
            let (watcher, mut updates) = ConfigWatcher::new(path, overrides.clone());
            let handle = watcher.run()?;
            let server = Arc::clone(&server);
            tokio::spawn(async move {
                while let Some(config) = updates.recv().await {
                    if let Err(e) = server.reload(config) {
                        tracing::error!(error = %e, "Rejected config change");
                    }
                }
            });
            Some(handle)
        }
        _ => None,
    };

    let code = signals::handle_signals(server, cli.config, overrides).await?;
    tracing::info!(exit_code = code, "Shutdown complete");
    std::process::exit(code);
}
