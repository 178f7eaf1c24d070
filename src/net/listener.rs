//! Listener and dialer capabilities, and the TCP socket listener.
//!
//! # Responsibilities
//! - Define the `Listener` and `Dialer` capabilities every transport exposes
//! - Bind TCP listeners and enforce max_connections via semaphore
//! - Classify accept failures as transient (retry) or closed (stop)
//!
//! # Design Decisions
//! - Accepted streams are boxed so socket and in-memory connections share one
//!   worker path
//! - Closing a socket listener is level-triggered: any accept started after
//!   close fails immediately

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::lifecycle::shutdown::Latch;

/// Errors reported by transports on accept, dial, and close.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// Operation attempted after the transport was closed.
    #[error("use of closed network connection")]
    Closed,
    /// Redundant close.
    #[error("listener is already closed")]
    AlreadyClosed,
}

/// Error returned by [`Listener::accept`].
#[derive(Debug, Error)]
pub enum AcceptError {
    /// The listener was closed. Never transient, always ends the accept loop.
    #[error("listener closed")]
    Closed,
    /// Socket-level failure (fd exhaustion, aborted handshake, ...).
    #[error("accept failed: {0}")]
    Transient(#[source] io::Error),
}

impl AcceptError {
    /// Whether the accept loop has to stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AcceptError::Closed)
    }
}

impl From<TransportError> for AcceptError {
    fn from(_: TransportError) -> Self {
        AcceptError::Closed
    }
}

/// Error type for binding listeners.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Failed to bind to address.
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },
}

/// Address of a listener or peer. Memory addresses are diagnostic only.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NetAddr {
    Tcp(SocketAddr),
    Memory(String),
}

impl NetAddr {
    /// Network name, as a dialer would spell it.
    pub fn network(&self) -> &'static str {
        match self {
            NetAddr::Tcp(_) => "tcp",
            NetAddr::Memory(_) => "memory",
        }
    }
}

impl fmt::Display for NetAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetAddr::Tcp(addr) => write!(f, "{addr}"),
            NetAddr::Memory(name) => write!(f, "memory:{name}"),
        }
    }
}

/// Byte stream usable by a connection worker.
pub trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> AsyncStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// Type-erased connection stream.
pub type BoxedStream = Box<dyn AsyncStream>;

/// A connection handed out by [`Listener::accept`].
pub struct Accepted {
    pub stream: BoxedStream,
    pub peer: NetAddr,
    /// Connection slot, released when the worker drops it.
    pub permit: Option<ConnectionPermit>,
}

impl Accepted {
    pub fn new(stream: impl AsyncStream + 'static, peer: NetAddr) -> Self {
        Self {
            stream: Box::new(stream),
            peer,
            permit: None,
        }
    }
}

impl fmt::Debug for Accepted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Accepted")
            .field("peer", &self.peer)
            .field("permit", &self.permit.is_some())
            .finish_non_exhaustive()
    }
}

/// Server side of a transport.
#[async_trait]
pub trait Listener: Send + Sync {
    /// Wait for the next connection.
    async fn accept(&self) -> Result<Accepted, AcceptError>;

    /// Close the listener. The first call returns `Ok`, later calls
    /// return [`TransportError::AlreadyClosed`].
    fn close(&self) -> Result<(), TransportError>;

    fn local_addr(&self) -> NetAddr;

    /// Flag a deliberate close so the accept loop exits quietly.
    fn mark_shutting_down(&self) {}

    fn is_shutting_down(&self) -> bool {
        false
    }
}

/// Client side of a transport.
#[async_trait]
pub trait Dialer: Send + Sync {
    type Conn: AsyncStream;

    async fn dial(&self, network: &str, address: &str) -> Result<Self::Conn, TransportError>;
}

/// A bounded TCP listener that limits concurrent connections.
///
/// Uses a semaphore to enforce `max_connections`. When the limit is reached,
/// accept waits until a slot becomes available.
pub struct SocketListener {
    /// The underlying TCP listener, taken on close.
    inner: Mutex<Option<Arc<TcpListener>>>,
    local_addr: SocketAddr,
    closed: Latch,
    /// Semaphore to limit concurrent connections.
    connection_limit: Arc<Semaphore>,
    /// Configured maximum connections.
    max_connections: usize,
}

impl SocketListener {
    /// Bind to `address` with a connection limit.
    pub async fn bind(address: &str, max_connections: usize) -> Result<Self, ListenerError> {
        let bind_error = |source| ListenerError::Bind {
            address: address.to_string(),
            source,
        };
        let addr: SocketAddr = address
            .parse()
            .map_err(|e| bind_error(io::Error::new(io::ErrorKind::InvalidInput, e)))?;

        let listener = TcpListener::bind(addr).await.map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;

        tracing::info!(
            address = %local_addr,
            max_connections,
            "Listener bound"
        );

        Ok(Self {
            inner: Mutex::new(Some(Arc::new(listener))),
            local_addr,
            closed: Latch::new(),
            connection_limit: Arc::new(Semaphore::new(max_connections)),
            max_connections,
        })
    }

    /// The bound socket address, resolved if port 0 was requested.
    pub fn local_socket_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Get current available connection slots.
    pub fn available_permits(&self) -> usize {
        self.connection_limit.available_permits()
    }

    /// Get configured maximum connections.
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    fn current(&self) -> Option<Arc<TcpListener>> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Listener for SocketListener {
    async fn accept(&self) -> Result<Accepted, AcceptError> {
        let listener = self.current().ok_or(AcceptError::Closed)?;

        // Acquire permit first (backpressure)
        let permit = tokio::select! {
            biased;
            _ = self.closed.wait() => return Err(AcceptError::Closed),
            permit = Arc::clone(&self.connection_limit).acquire_owned() => {
                permit.map_err(|_| AcceptError::Closed)?
            }
        };

        let (stream, addr) = tokio::select! {
            biased;
            _ = self.closed.wait() => return Err(AcceptError::Closed),
            accepted = listener.accept() => accepted.map_err(AcceptError::Transient)?,
        };

        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(peer_addr = %addr, error = %e, "Failed to set TCP_NODELAY");
        }

        tracing::debug!(
            peer_addr = %addr,
            available_permits = self.connection_limit.available_permits(),
            "Connection accepted"
        );

        Ok(Accepted {
            stream: Box::new(stream),
            peer: NetAddr::Tcp(addr),
            permit: Some(ConnectionPermit { _permit: permit }),
        })
    }

    fn close(&self) -> Result<(), TransportError> {
        let taken = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if taken.is_none() {
            return Err(TransportError::AlreadyClosed);
        }
        self.closed.trigger();
        self.connection_limit.close();
        Ok(())
    }

    fn local_addr(&self) -> NetAddr {
        NetAddr::Tcp(self.local_addr)
    }
}

/// A permit representing a connection slot.
///
/// When dropped, the connection slot is released back to the pool.
/// Released on drop, panics included.
#[derive(Debug)]
pub struct ConnectionPermit {
    _permit: OwnedSemaphorePermit,
}
