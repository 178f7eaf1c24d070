//! Broker connection acceptance and graceful shutdown.
//!
//! Accepts client and cluster connections from TCP listeners and from an
//! in-memory pipe for in-process clients, tracks every connection by
//! category, and tears all of it down in order on shutdown.

// Core subsystems
pub mod net;
pub mod pipe;
pub mod server;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::ServerConfig;
pub use lifecycle::ShutdownReport;
pub use pipe::{HandoffQueue, InMemoryTransport, NamedPipe};
pub use server::{ConnectionHandler, ListenerKind, Server};
