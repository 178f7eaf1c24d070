//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGINT, SIGTERM, SIGHUP, SIGUSR2)
//! - Translate signals to [`SignalAction`]s
//! - Run the action against the server and report the exit code
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - SIGHUP triggers config reload, not shutdown
//! - SIGUSR2 starts lame duck in its own task; SIGINT/SIGTERM still cut it short
//! - SIGTERM exits with 128 + 15 after a full graceful shutdown

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Overrides;
use crate::server::Server;

/// Exit code after SIGTERM.
pub const SIGTERM_EXIT_CODE: i32 = 143;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// Graceful shutdown, then exit with `exit_code`.
    Shutdown { exit_code: i32 },
    /// Reload the config file.
    Reload,
    /// Start lame-duck mode; the process exits 0 once it ends in shutdown.
    LameDuck,
}

/// Run `action`. Returns the process exit code once the server is done, or
/// `None` if it keeps running.
///
/// Reloads read `config_path` and reapply `overrides`.
pub async fn apply(
    server: &Arc<Server>,
    action: SignalAction,
    config_path: Option<&Path>,
    overrides: &Overrides,
) -> Option<i32> {
    match action {
        SignalAction::Shutdown { exit_code } => {
            tracing::info!(exit_code, "Shutdown signal received");
            if server.shutdown().await.is_none() {
                server.wait_for_shutdown().await;
            }
            Some(exit_code)
        }
        SignalAction::Reload => {
            let Some(path) = config_path else {
                tracing::warn!("Reload requested but the server was started without a config file");
                return None;
            };
            match server.reload_from(path, overrides) {
                Ok(()) => tracing::info!(path = ?path, "Configuration reloaded"),
                Err(e) => tracing::error!(path = ?path, error = %e, "Reload failed, keeping current configuration"),
            }
            None
        }
        SignalAction::LameDuck => {
            let server = Arc::clone(server);
            // Not a tracked worker: it ends by calling shutdown itself.
            tokio::spawn(async move {
                if server.enter_lame_duck_mode().await.is_none() {
                    tracing::debug!("Lame duck not entered, already shutting down or in lame duck");
                }
            });
            None
        }
    }
}

/// Handle signals until one of them ends the server. Returns the exit code.
///
/// Also returns if the server is shut down some other way.
#[cfg(unix)]
pub async fn handle_signals(
    server: Arc<Server>,
    config_path: Option<PathBuf>,
    overrides: Overrides,
) -> io::Result<i32> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sighup = signal(SignalKind::hangup())?;
    let mut sigusr2 = signal(SignalKind::user_defined2())?;

    loop {
        let action = tokio::select! {
            _ = sigint.recv() => SignalAction::Shutdown { exit_code: 0 },
            _ = sigterm.recv() => SignalAction::Shutdown { exit_code: SIGTERM_EXIT_CODE },
            _ = sighup.recv() => SignalAction::Reload,
            _ = sigusr2.recv() => SignalAction::LameDuck,
            _ = server.wait_for_shutdown() => return Ok(0),
        };
        tracing::debug!(action = ?action, "Signal received");
        if let Some(code) = apply(&server, action, config_path.as_deref(), &overrides).await {
            return Ok(code);
        }
    }
}

/// Handle Ctrl+C until the server is shut down. Returns the exit code.
#[cfg(not(unix))]
pub async fn handle_signals(
    server: Arc<Server>,
    config_path: Option<PathBuf>,
    overrides: Overrides,
) -> io::Result<i32> {
    tokio::select! {
        res = tokio::signal::ctrl_c() => res?,
        _ = server.wait_for_shutdown() => return Ok(0),
    }
    let code = apply(
        &server,
        SignalAction::Shutdown { exit_code: 0 },
        config_path.as_deref(),
        &overrides,
    )
    .await;
    Ok(code.unwrap_or(0))
}
