//! Connection handles and lifecycle tracking.
//!
//! # Responsibilities
//! - Generate process-unique connection IDs
//! - Track connection state (Active → Closed) and why it closed
//! - Let the owning worker wait for a forced close

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::watch;

use crate::net::listener::NetAddr;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cid-{}", self.0)
    }
}

/// Class of connection, each tracked in its own registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Client,
    Route,
    Gateway,
    Leaf,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Client,
        Category::Route,
        Category::Gateway,
        Category::Leaf,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Client => "client",
            Category::Route => "route",
            Category::Gateway => "gateway",
            Category::Leaf => "leaf",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a connection was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The peer went away or the handler finished.
    ClientClosed,
    /// The handler failed on I/O.
    ReadError,
    /// The server tore the connection down.
    ServerShutdown,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::ClientClosed => "client_closed",
            CloseReason::ReadError => "read_error",
            CloseReason::ServerShutdown => "server_shutdown",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection state for lifecycle tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Connection is active and owned by its worker.
    Active,
    /// Connection is closed.
    Closed(CloseReason),
}

/// A live connection as seen by the registries.
///
/// The byte stream itself is owned by the worker; this handle only carries
/// identity and the close signal, so it can be closed from any task.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    category: Category,
    peer: NetAddr,
    no_reconnect: AtomicBool,
    reason: watch::Sender<Option<CloseReason>>,
}

impl Connection {
    pub fn new(category: Category, peer: NetAddr) -> Self {
        let (reason, _) = watch::channel(None);
        Self {
            id: ConnectionId::new(),
            category,
            peer,
            no_reconnect: AtomicBool::new(false),
            reason,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn peer(&self) -> &NetAddr {
        &self.peer
    }

    /// Tell the remote side (routes, leaf remotes) not to reconnect.
    pub fn set_no_reconnect(&self) {
        self.no_reconnect.store(true, Ordering::SeqCst);
    }

    pub fn is_reconnectable(&self) -> bool {
        !self.no_reconnect.load(Ordering::SeqCst)
    }

    /// Close the connection. The first reason wins; returns whether this
    /// call performed the close.
    pub fn close(&self, reason: CloseReason) -> bool {
        self.reason.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        })
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        *self.reason.borrow()
    }

    pub fn state(&self) -> ConnectionState {
        match self.close_reason() {
            Some(reason) => ConnectionState::Closed(reason),
            None => ConnectionState::Active,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.close_reason().is_some()
    }

    /// Wait until the connection is closed and return why. Returns at once
    /// if it already is.
    pub async fn closed(&self) -> CloseReason {
        let mut rx = self.reason.subscribe();
        let reason = rx.wait_for(Option::is_some).await.ok().and_then(|r| *r);
        reason.unwrap_or(CloseReason::ServerShutdown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn conn() -> Connection {
        Connection::new(Category::Client, NetAddr::Memory("test".into()))
    }

    #[test]
    fn connection_id_unique() {
        let id1 = ConnectionId::new();
        let id2 = ConnectionId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn first_close_reason_wins() {
        let c = conn();
        assert_eq!(c.state(), ConnectionState::Active);

        assert!(c.close(CloseReason::ServerShutdown));
        assert!(!c.close(CloseReason::ClientClosed));
        assert_eq!(c.close_reason(), Some(CloseReason::ServerShutdown));
        assert_eq!(c.state(), ConnectionState::Closed(CloseReason::ServerShutdown));
    }

    #[test]
    fn no_reconnect_is_sticky() {
        let c = conn();
        assert!(c.is_reconnectable());
        c.set_no_reconnect();
        assert!(!c.is_reconnectable());
    }

    #[tokio::test]
    async fn closed_wakes_waiter() {
        let c = Arc::new(conn());
        let waiter = {
            let c = Arc::clone(&c);
            tokio::spawn(async move { c.closed().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        c.close(CloseReason::ReadError);

        let reason = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reason, CloseReason::ReadError);
    }

    #[tokio::test]
    async fn closed_is_level_triggered() {
        let c = conn();
        c.close(CloseReason::ClientClosed);
        assert_eq!(c.closed().await, CloseReason::ClientClosed);
    }
}
