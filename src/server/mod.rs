//! Broker server core: listeners, accept loops, connection workers.
//!
//! # Data Flow
//! ```text
//! start_accept_loop(kind, listener)
//!     → acceptor.rs (one task per listener, backoff on transient errors)
//!     → one worker task per connection
//!         → registry.rs (register under the listener's category)
//!         → handler.rs (protocol processing)
//!         → close path (deregister, release slot)
//!
//! Shutdown (lifecycle/shutdown.rs):
//!     close listeners → force-close connections → wait for every worker
//! ```
//!
//! # Design Decisions
//! - Every task (accept loops and connection workers) runs through one
//!   `WorkerGroup`, so shutdown can wait for full drain
//! - Listener set and shutdown flag share one lock
//! - Live config is swapped atomically on reload

pub mod acceptor;
pub mod handler;
pub mod registry;
pub mod reload;

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arc_swap::ArcSwap;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::lifecycle::shutdown::Latch;
use crate::lifecycle::workers::WorkerGroup;
use crate::net::connection::Category;
use crate::net::listener::{BoxedStream, Listener, NetAddr};
use crate::pipe::NamedPipe;

pub use handler::{ConnectionHandler, Echo};
pub use registry::{ConnectionRegistry, RegistrySealed};
pub use reload::ReloadError;

/// Source of incoming connections, one accept loop each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ListenerKind {
    /// External client socket.
    Client,
    /// In-memory pipe for in-process clients.
    Pipe,
    Route,
    Gateway,
    Leaf,
}

impl ListenerKind {
    /// Registry category connections from this listener land in.
    pub fn category(&self) -> Category {
        match self {
            ListenerKind::Client | ListenerKind::Pipe => Category::Client,
            ListenerKind::Route => Category::Route,
            ListenerKind::Gateway => Category::Gateway,
            ListenerKind::Leaf => Category::Leaf,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ListenerKind::Client => "client",
            ListenerKind::Pipe => "pipe",
            ListenerKind::Route => "route",
            ListenerKind::Gateway => "gateway",
            ListenerKind::Leaf => "leafnode",
        }
    }
}

impl fmt::Display for ListenerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ServerError {
    #[error("server is shutting down")]
    ShuttingDown,
    #[error("a {0} listener is already running")]
    ListenerInUse(ListenerKind),
    #[error("client listener is closed in lame duck mode")]
    LameDuck,
}

/// State guarded by the server lock.
#[derive(Default)]
pub(crate) struct ServerState {
    pub(crate) shutting_down: bool,
    pub(crate) lame_duck: bool,
    pub(crate) listeners: BTreeMap<ListenerKind, Arc<dyn Listener>>,
    pub(crate) pipe: Option<Arc<NamedPipe>>,
    pub(crate) ports_file: Option<PathBuf>,
}

pub struct Server {
    id: Uuid,
    pub(crate) config: ArcSwap<ServerConfig>,
    pub(crate) handler: Arc<dyn ConnectionHandler>,
    pub(crate) state: Mutex<ServerState>,
    pub(crate) registry: ConnectionRegistry,
    pub(crate) workers: WorkerGroup,
    /// Shared cancellation signal, triggered once by shutdown.
    pub(crate) quit: Latch,
    pub(crate) shutdown_complete: Latch,
    pub(crate) done_tx: mpsc::UnboundedSender<ListenerKind>,
    pub(crate) done_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<ListenerKind>>,
}

impl Server {
    pub fn new(config: ServerConfig, handler: Arc<dyn ConnectionHandler>) -> Arc<Self> {
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            id: Uuid::new_v4(),
            config: ArcSwap::from_pointee(config),
            handler,
            state: Mutex::new(ServerState::default()),
            registry: ConnectionRegistry::new(),
            workers: WorkerGroup::new(),
            quit: Latch::new(),
            shutdown_complete: Latch::new(),
            done_tx,
            done_rx: tokio::sync::Mutex::new(done_rx),
        })
    }

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Snapshot of the live configuration.
    pub fn config(&self) -> Arc<ServerConfig> {
        self.config.load_full()
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Running accept loops plus connection workers.
    pub fn active_workers(&self) -> usize {
        self.workers.active()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.lock_state().shutting_down
    }

    pub fn is_lame_duck(&self) -> bool {
        self.lock_state().lame_duck
    }

    /// Whether the shared cancellation signal has fired.
    pub fn is_quitting(&self) -> bool {
        self.quit.is_triggered()
    }

    /// The in-memory pipe, while it is running.
    pub fn memory_pipe(&self) -> Option<Arc<NamedPipe>> {
        self.lock_state().pipe.clone()
    }

    pub fn listener_addr(&self, kind: ListenerKind) -> Option<NetAddr> {
        self.lock_state()
            .listeners
            .get(&kind)
            .map(|l| l.local_addr())
    }

    pub fn active_listeners(&self) -> Vec<ListenerKind> {
        self.lock_state().listeners.keys().copied().collect()
    }

    /// Register `listener` and start its accept loop.
    pub fn start_accept_loop(
        self: &Arc<Self>,
        kind: ListenerKind,
        listener: Arc<dyn Listener>,
    ) -> Result<(), ServerError> {
        self.register_listener(kind, listener, None)
    }

    /// Start accepting in-process clients on `pipe`.
    pub fn start_with_pipe(self: &Arc<Self>, pipe: Arc<NamedPipe>) -> Result<(), ServerError> {
        let listener: Arc<dyn Listener> = pipe.clone();
        self.register_listener(ListenerKind::Pipe, listener, Some(pipe))
    }

    fn register_listener(
        self: &Arc<Self>,
        kind: ListenerKind,
        listener: Arc<dyn Listener>,
        pipe: Option<Arc<NamedPipe>>,
    ) -> Result<(), ServerError> {
        let mut state = self.lock_state();
        if state.shutting_down {
            return Err(ServerError::ShuttingDown);
        }
        if state.lame_duck && kind == ListenerKind::Client {
            return Err(ServerError::LameDuck);
        }
        if state.listeners.contains_key(&kind) {
            return Err(ServerError::ListenerInUse(kind));
        }
        state.listeners.insert(kind, Arc::clone(&listener));
        if pipe.is_some() {
            state.pipe = pipe;
        }

        // Tracked while the lock is held so shutdown cannot miss it.
        let server = Arc::clone(self);
        self.workers
            .spawn(async move { server.run_accept_loop(kind, listener).await });
        Ok(())
    }

    /// Adopt a connection the server initiated (an outbound route or leaf
    /// remote) and run it like an accepted one.
    pub fn spawn_solicited(
        self: &Arc<Self>,
        category: Category,
        stream: BoxedStream,
        peer: NetAddr,
    ) -> Result<(), ServerError> {
        let state = self.lock_state();
        if state.shutting_down {
            return Err(ServerError::ShuttingDown);
        }
        let server = Arc::clone(self);
        self.workers
            .spawn(async move { server.run_connection(category, stream, peer, None).await });
        drop(state);
        Ok(())
    }

    pub(crate) fn set_ports_file(&self, path: PathBuf) {
        self.lock_state().ports_file = Some(path);
    }

    /// Wait until a shutdown has fully completed.
    pub async fn wait_for_shutdown(&self) {
        self.shutdown_complete.wait().await;
    }

    pub fn is_shutdown_complete(&self) -> bool {
        self.shutdown_complete.is_triggered()
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("id", &self.id)
            .field("active_workers", &self.workers.active())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipe::NamedPipe;

    #[test]
    fn listener_kinds_map_to_categories() {
        assert_eq!(ListenerKind::Client.category(), Category::Client);
        assert_eq!(ListenerKind::Pipe.category(), Category::Client);
        assert_eq!(ListenerKind::Route.category(), Category::Route);
        assert_eq!(ListenerKind::Gateway.category(), Category::Gateway);
        assert_eq!(ListenerKind::Leaf.category(), Category::Leaf);
    }

    #[tokio::test]
    async fn refuses_second_listener_of_a_kind() {
        let server = Server::new(ServerConfig::default(), Arc::new(Echo));
        server
            .start_with_pipe(Arc::new(NamedPipe::new("a")))
            .unwrap();
        assert_eq!(
            server.start_with_pipe(Arc::new(NamedPipe::new("b"))),
            Err(ServerError::ListenerInUse(ListenerKind::Pipe))
        );
        assert_eq!(server.memory_pipe().unwrap().name(), "a");

        server.shutdown().await;
        assert_eq!(
            server.start_with_pipe(Arc::new(NamedPipe::new("c"))),
            Err(ServerError::ShuttingDown)
        );
    }
}
