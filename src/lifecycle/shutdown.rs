//! Shutdown coordination for the server.

use tokio::sync::watch;

use crate::lifecycle::ports;
use crate::net::connection::CloseReason;
use crate::net::listener::TransportError;
use crate::server::Server;

/// One-shot, level-triggered signal.
///
/// Once triggered it stays triggered: tasks that start waiting afterwards
/// return immediately.
#[derive(Debug)]
pub struct Latch {
    tx: watch::Sender<bool>,
}

impl Latch {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Fire the latch. Returns true for the call that fired it.
    pub fn trigger(&self) -> bool {
        self.tx.send_if_modified(|fired| {
            if *fired {
                return false;
            }
            *fired = true;
            true
        })
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until the latch fires.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so this only returns once fired.
        let _ = rx.wait_for(|fired| *fired).await;
    }
}

impl Default for Latch {
    fn default() -> Self {
        Self::new()
    }
}

/// What the teardown did, returned to the caller that performed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Listener completion signals received.
    pub listeners_stopped: usize,
    /// Connections force-closed.
    pub connections_closed: usize,
}

impl Server {
    /// Shut the server down: close every listener, force-close every tracked
    /// connection, and wait for every worker to exit.
    ///
    /// Idempotent. Only the first caller performs the teardown and gets a
    /// report; concurrent and later callers return `None` immediately (use
    /// [`Server::wait_for_shutdown`] to wait for completion).
    pub async fn shutdown(&self) -> Option<ShutdownReport> {
        let (listeners, ports_file) = {
            let mut state = self.lock_state();
            if state.shutting_down {
                return None;
            }
            state.shutting_down = true;
            state.pipe = None;
            (std::mem::take(&mut state.listeners), state.ports_file.take())
        };
        tracing::info!(server_id = %self.id(), "Initiating shutdown");

        let conns = self.registry.seal_and_snapshot();

        let mut done_expected = 0usize;
        for (kind, listener) in &listeners {
            done_expected += 1;
            listener.mark_shutting_down();
            match listener.close() {
                Ok(()) => tracing::debug!(listener = %kind, "Listener closed"),
                Err(TransportError::AlreadyClosed) => {
                    tracing::debug!(listener = %kind, "Listener was already closed")
                }
                Err(e) => tracing::warn!(listener = %kind, error = %e, "Failed to close listener"),
            }
        }
        drop(listeners);

        // Release tasks parked on the cancellation signal.
        self.quit.trigger();

        for conn in &conns {
            conn.set_no_reconnect();
            conn.close(CloseReason::ServerShutdown);
        }
        tracing::debug!(
            connections = conns.len(),
            listeners = done_expected,
            "Waiting for accept loops to exit"
        );

        let mut listeners_stopped = 0usize;
        {
            let mut done_rx = self.done_rx.lock().await;
            while listeners_stopped < done_expected {
                match done_rx.recv().await {
                    Some(kind) => {
                        listeners_stopped += 1;
                        tracing::debug!(listener = %kind, "Accept loop reported exit");
                    }
                    None => break,
                }
            }
        }

        self.workers.wait().await;

        if let Some(path) = ports_file {
            ports::delete_ports_file(&path);
        }

        let report = ShutdownReport {
            listeners_stopped,
            connections_closed: conns.len(),
        };
        tracing::info!(
            listeners = report.listeners_stopped,
            connections = report.connections_closed,
            "Server exiting"
        );
        self.shutdown_complete.trigger();
        Some(report)
    }
}
