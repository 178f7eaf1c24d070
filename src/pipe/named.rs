//! Named in-memory pipe used by in-process clients.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::net::listener::{AcceptError, Accepted, Dialer, Listener, NetAddr, TransportError};
use crate::pipe::memory::{InMemoryTransport, MemoryConn, TransportOptions};

/// An [`InMemoryTransport`] with a name, the last address it was dialed with,
/// and a flag separating a deliberate shutdown close from an unexpected one.
pub struct NamedPipe {
    name: String,
    address: Mutex<Option<String>>,
    transport: InMemoryTransport,
    shutting_down: AtomicBool,
}

impl NamedPipe {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_options(name, TransportOptions::default())
    }

    pub fn with_options(name: impl Into<String>, options: TransportOptions) -> Self {
        Self {
            name: name.into(),
            address: Mutex::new(None),
            transport: InMemoryTransport::new(options),
            shutting_down: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Address passed to the most recent dial.
    pub fn address(&self) -> Option<String> {
        self.address
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Dial the pipe. `network` is accepted for dialer compatibility only.
    pub async fn dial(&self, _network: &str, address: &str) -> Result<MemoryConn, TransportError> {
        *self.address.lock().unwrap_or_else(PoisonError::into_inner) = Some(address.to_string());
        self.transport.dial().await
    }

    pub fn mark_shutting_down(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    pub fn transport(&self) -> &InMemoryTransport {
        &self.transport
    }
}

#[async_trait]
impl Listener for NamedPipe {
    async fn accept(&self) -> Result<Accepted, AcceptError> {
        let conn = self.transport.accept().await?;
        Ok(Accepted::new(conn, NetAddr::Memory(self.name.clone())))
    }

    fn close(&self) -> Result<(), TransportError> {
        self.transport.close()
    }

    fn local_addr(&self) -> NetAddr {
        NetAddr::Memory(self.name.clone())
    }

    fn mark_shutting_down(&self) {
        NamedPipe::mark_shutting_down(self);
    }

    fn is_shutting_down(&self) -> bool {
        NamedPipe::is_shutting_down(self)
    }
}

#[async_trait]
impl Dialer for NamedPipe {
    type Conn = MemoryConn;

    async fn dial(&self, network: &str, address: &str) -> Result<MemoryConn, TransportError> {
        NamedPipe::dial(self, network, address).await
    }
}
