//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection            In-process dial
//!     → listener.rs (SocketListener)     → pipe/ (InMemoryTransport)
//!              \                            /
//!               → Listener::accept → Accepted (boxed stream)
//!               → connection.rs (Connection handle, close reason)
//!               → Hand off to the connection handler
//!
//! Connection States:
//!     Active → Closed(reason)
//! ```
//!
//! # Design Decisions
//! - Socket and in-memory listeners share one capability trait
//! - Each connection tracked for graceful shutdown
//! - TLS is negotiated by the handler, not here

pub mod connection;
pub mod listener;

pub use connection::{Category, CloseReason, Connection, ConnectionId, ConnectionState};
pub use listener::{
    AcceptError, Accepted, AsyncStream, BoxedStream, Dialer, Listener, ListenerError, NetAddr,
    SocketListener, TransportError,
};
