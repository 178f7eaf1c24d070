//! Lame-duck mode: stop taking new socket clients, let existing ones go
//! gradually, then shut down.

use std::sync::Arc;
use std::time::Duration;

use crate::lifecycle::shutdown::ShutdownReport;
use crate::net::connection::{Category, CloseReason};
use crate::server::{ListenerKind, Server};

impl Server {
    /// Enter lame-duck mode and shut down at the end of it.
    ///
    /// The client socket listener is closed right away; its accept loop parks
    /// on the cancellation signal instead of reporting completion. After the
    /// grace period, client connections are closed in batches spread over the
    /// rest of the configured duration, then [`Server::shutdown`] runs.
    ///
    /// Returns `None` without doing anything if the server is already
    /// shutting down or in lame-duck mode.
    pub async fn enter_lame_duck_mode(self: &Arc<Self>) -> Option<ShutdownReport> {
        let client_listener = {
            let mut state = self.lock_state();
            if state.shutting_down || state.lame_duck {
                return None;
            }
            state.lame_duck = true;
            state.listeners.remove(&ListenerKind::Client)
        };

        let config = self.config();
        let duration = config.lame_duck.duration();
        let grace = config.lame_duck.grace_period();
        tracing::info!(
            duration = ?duration,
            grace_period = ?grace,
            "Entering lame duck mode, stop accepting new clients"
        );

        if let Some(listener) = client_listener {
            if let Err(e) = listener.close() {
                tracing::debug!(error = %e, "Client listener was already closed");
            }
        }

        if !self.pause(grace).await {
            return self.shutdown().await;
        }

        let clients = self.registry.connections(Category::Client);
        if !clients.is_empty() {
            let window = duration.saturating_sub(grace);
            let (batch, pause) = batch_plan(clients.len(), window);
            tracing::info!(
                clients = clients.len(),
                batch,
                pause = ?pause,
                "Closing existing clients"
            );
            for chunk in clients.chunks(batch) {
                for conn in chunk {
                    conn.close(CloseReason::ServerShutdown);
                }
                if !self.pause(pause).await {
                    break;
                }
            }
        }

        self.shutdown().await
    }

    /// Sleep for `duration` unless shutdown starts first. Returns false if it did.
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.quit.wait() => false,
        }
    }
}

/// Split `count` closes over `window`: returns (connections per batch, pause
/// between batches). Batches grow once the window is too short for one
/// millisecond per connection.
fn batch_plan(count: usize, window: Duration) -> (usize, Duration) {
    if count == 0 {
        return (1, Duration::ZERO);
    }
    let window_ms = usize::try_from(window.as_millis()).unwrap_or(usize::MAX).max(1);
    let batch = count.div_ceil(window_ms).max(1);
    let batches = count.div_ceil(batch);
    let pause = window / u32::try_from(batches).unwrap_or(u32::MAX);
    (batch, pause)
}
