//! Accept loops and per-connection workers.
//!
//! # Responsibilities
//! - Accept until the listener closes, backing off on transient socket errors
//! - Spawn one tracked worker per accepted connection
//! - Report loop termination to the shutdown coordinator exactly once

use std::sync::Arc;

use crate::net::connection::{Category, CloseReason, Connection};
use crate::net::listener::{AcceptError, Accepted, BoxedStream, ConnectionPermit, Listener, NetAddr};
use crate::observability::metrics;
use crate::resilience::backoff::calculate_backoff;
use crate::server::{ListenerKind, Server};

/// How an accept loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopExit {
    /// Counted by shutdown: report completion.
    Stopped,
    /// Detached by lame-duck mode: shutdown does not wait for it.
    Detached,
}

impl Server {
    pub(crate) async fn run_accept_loop(self: Arc<Self>, kind: ListenerKind, listener: Arc<dyn Listener>) {
        let address = listener.local_addr();
        tracing::info!(listener = %kind, address = %address, "Accept loop started");

        let mut failures: u32 = 0;
        let exit = loop {
            match listener.accept().await {
                Ok(accepted) => {
                    failures = 0;
                    metrics::connection_accepted(kind);
                    self.spawn_connection(kind.category(), accepted);
                }
                Err(AcceptError::Transient(e)) => {
                    failures = failures.saturating_add(1);
                    let config = self.config();
                    let delay = calculate_backoff(
                        failures,
                        config.accept.min_sleep_ms,
                        config.accept.max_sleep_ms,
                    );
                    tracing::warn!(
                        listener = %kind,
                        error = %e,
                        attempt = failures,
                        delay = ?delay,
                        "Temporary accept error, backing off"
                    );
                    metrics::accept_error(kind);
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.quit.wait() => {}
                    }
                }
                Err(AcceptError::Closed) => {
                    if kind == ListenerKind::Client && self.is_lame_duck() {
                        tracing::info!(listener = %kind, "Not accepting new clients, waiting for shutdown");
                        self.quit.wait().await;
                        break LoopExit::Detached;
                    }
                    if listener.is_shutting_down() || self.is_shutting_down() {
                        tracing::debug!(listener = %kind, "Listener closed for shutdown");
                    } else {
                        tracing::error!(listener = %kind, address = %address, "Listener closed unexpectedly");
                    }
                    break LoopExit::Stopped;
                }
            }
        };

        if exit == LoopExit::Stopped {
            // The receiver lives as long as the server.
            let _ = self.done_tx.send(kind);
        }
        tracing::info!(listener = %kind, address = %address, "Accept loop ended");
    }

    fn spawn_connection(self: &Arc<Self>, category: Category, accepted: Accepted) {
        let Accepted { stream, peer, permit } = accepted;
        let server = Arc::clone(self);
        self.workers
            .spawn(async move { server.run_connection(category, stream, peer, permit).await });
    }

    /// Register, serve, and tear down one connection.
    pub(crate) async fn run_connection(
        &self,
        category: Category,
        stream: BoxedStream,
        peer: NetAddr,
        permit: Option<ConnectionPermit>,
    ) {
        let conn = Arc::new(Connection::new(category, peer));
        if let Err(e) = self.registry.insert(Arc::clone(&conn)) {
            conn.set_no_reconnect();
            conn.close(CloseReason::ServerShutdown);
            tracing::debug!(
                connection_id = %conn.id(),
                peer = %conn.peer(),
                error = %e,
                "Connection refused during shutdown"
            );
            return;
        }
        metrics::connection_opened(category);
        tracing::debug!(
            connection_id = %conn.id(),
            category = %category,
            peer = %conn.peer(),
            "Connection registered"
        );

        let handler = Arc::clone(&self.handler);
        let reason = tokio::select! {
            result = handler.serve(Arc::clone(&conn), stream) => match result {
                Ok(()) => CloseReason::ClientClosed,
                Err(e) => {
                    tracing::debug!(connection_id = %conn.id(), error = %e, "Connection I/O error");
                    CloseReason::ReadError
                }
            },
            reason = conn.closed() => reason,
        };

        conn.close(reason);
        let reason = conn.close_reason().unwrap_or(reason);
        self.registry.remove(&conn);
        drop(permit);

        metrics::connection_closed(category, reason);
        tracing::debug!(
            connection_id = %conn.id(),
            category = %category,
            reason = %reason,
            "Connection closed"
        );
    }
}
