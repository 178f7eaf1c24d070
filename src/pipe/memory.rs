//! In-memory listener/dialer pair.
//!
//! `dial` only returns once an `accept` has claimed the server end of the
//! pair, the same guarantee a real dial gives once the peer accepted.

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio::sync::oneshot;

use crate::net::listener::{AcceptError, Accepted, Dialer, Listener, NetAddr, TransportError};
use crate::pipe::queue::{EnqueueError, HandoffQueue};

/// Default number of dials that may wait for an accept.
pub const DEFAULT_MAX_ACCEPT_QUEUE: usize = 10 * 1024;
/// Default per-direction buffer of an in-memory connection, in bytes.
pub const DEFAULT_MAX_PIPE_BUFFER: usize = 1024;

const LISTENER_NAME: &str = "in-memory-listener";

/// Sizing for an [`InMemoryTransport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportOptions {
    pub max_accept_queue: usize,
    pub max_pipe_buffer: usize,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            max_accept_queue: DEFAULT_MAX_ACCEPT_QUEUE,
            max_pipe_buffer: DEFAULT_MAX_PIPE_BUFFER,
        }
    }
}

/// One end of an in-memory connection.
///
/// Dropping it closes that end: the peer reads EOF.
#[derive(Debug)]
pub struct MemoryConn {
    inner: DuplexStream,
    _endpoint: EndpointGuard,
}

/// Counts live endpoints of one transport.
#[derive(Debug)]
struct EndpointGuard {
    open: Arc<AtomicUsize>,
}

impl EndpointGuard {
    fn new(open: &Arc<AtomicUsize>) -> Self {
        open.fetch_add(1, Ordering::SeqCst);
        Self {
            open: Arc::clone(open),
        }
    }
}

impl Drop for EndpointGuard {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

impl AsyncRead for MemoryConn {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for MemoryConn {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

/// A pending connection transfer from a dialer to an acceptor.
#[derive(Debug)]
struct HandoffRecord {
    conn: MemoryConn,
    accepted: oneshot::Sender<()>,
}

/// In-memory dialer and listener.
///
/// Usable for in-process client/server communication without network stack
/// overhead, and for tests.
pub struct InMemoryTransport {
    queue: HandoffQueue<HandoffRecord>,
    options: TransportOptions,
    open_endpoints: Arc<AtomicUsize>,
}

impl InMemoryTransport {
    pub fn new(options: TransportOptions) -> Self {
        Self {
            queue: HandoffQueue::new(options.max_accept_queue),
            options,
            open_endpoints: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Wait for the next dialed connection and return its server end.
    ///
    /// Safe to call from concurrently running tasks. Fails immediately once
    /// the transport is closed.
    pub async fn accept(&self) -> Result<MemoryConn, TransportError> {
        loop {
            let record = self
                .queue
                .dequeue()
                .await
                .map_err(|_| TransportError::Closed)?;
            if record.accepted.send(()).is_ok() {
                return Ok(record.conn);
            }
            // The dialer gave up before we got here; its client end is gone.
            tracing::trace!("Discarding handoff abandoned by its dialer");
        }
    }

    /// Create a connection and wait until an `accept` claims it.
    ///
    /// Safe to call from concurrently running tasks. On a closed transport
    /// both ends of the new pair are dropped before returning.
    pub async fn dial(&self) -> Result<MemoryConn, TransportError> {
        let (client, server) = tokio::io::duplex(self.options.max_pipe_buffer);
        let client = MemoryConn {
            inner: client,
            _endpoint: EndpointGuard::new(&self.open_endpoints),
        };
        let server = MemoryConn {
            inner: server,
            _endpoint: EndpointGuard::new(&self.open_endpoints),
        };

        let (accepted_tx, accepted_rx) = oneshot::channel();
        let record = HandoffRecord {
            conn: server,
            accepted: accepted_tx,
        };
        if let Err(EnqueueError(record)) = self.queue.enqueue(record).await {
            drop(record);
            drop(client);
            return Err(TransportError::Closed);
        }

        match accepted_rx.await {
            Ok(()) => Ok(client),
            // Close discarded the record before any accept claimed it.
            Err(_) => Err(TransportError::Closed),
        }
    }

    /// Close the transport, failing pending and future accepts and dials.
    pub fn close(&self) -> Result<(), TransportError> {
        let abandoned = self.queue.close().ok_or(TransportError::AlreadyClosed)?;
        if !abandoned.is_empty() {
            tracing::debug!(
                pending = abandoned.len(),
                "Closing in-memory transport with unclaimed dials"
            );
        }
        drop(abandoned);
        Ok(())
    }

    pub fn local_addr(&self) -> NetAddr {
        NetAddr::Memory(LISTENER_NAME.to_string())
    }

    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }

    /// Dials queued and not yet claimed.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Live endpoints created by this transport, both ends counted.
    pub fn open_endpoints(&self) -> usize {
        self.open_endpoints.load(Ordering::SeqCst)
    }

    pub fn options(&self) -> TransportOptions {
        self.options
    }
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new(TransportOptions::default())
    }
}

#[async_trait]
impl Listener for InMemoryTransport {
    async fn accept(&self) -> Result<Accepted, AcceptError> {
        let conn = InMemoryTransport::accept(self).await?;
        Ok(Accepted::new(conn, self.local_addr()))
    }

    fn close(&self) -> Result<(), TransportError> {
        InMemoryTransport::close(self)
    }

    fn local_addr(&self) -> NetAddr {
        InMemoryTransport::local_addr(self)
    }
}

#[async_trait]
impl Dialer for InMemoryTransport {
    type Conn = MemoryConn;

    async fn dial(&self, _network: &str, _address: &str) -> Result<MemoryConn, TransportError> {
        InMemoryTransport::dial(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn small(max_accept_queue: usize) -> Arc<InMemoryTransport> {
        Arc::new(InMemoryTransport::new(TransportOptions {
            max_accept_queue,
            ..TransportOptions::default()
        }))
    }

    #[tokio::test]
    async fn dial_and_accept_exchange_bytes() {
        let transport = small(4);
        let dialer = {
            let transport = Arc::clone(&transport);
            tokio::spawn(async move { transport.dial().await })
        };

        let mut server = transport.accept().await.unwrap();
        let mut client = dialer.await.unwrap().unwrap();
        assert_eq!(transport.open_endpoints(), 2);

        client.write_all(b"PING\r\n").await.unwrap();
        let mut buf = [0u8; 6];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"PING\r\n");

        drop(client);
        let mut rest = Vec::new();
        server.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn dial_waits_for_accept() {
        let transport = small(4);
        let dialer = {
            let transport = Arc::clone(&transport);
            tokio::spawn(async move { transport.dial().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!dialer.is_finished());
        assert_eq!(transport.pending(), 1);

        let _server = transport.accept().await.unwrap();
        let client = tokio::time::timeout(Duration::from_secs(1), dialer)
            .await
            .unwrap()
            .unwrap();
        assert!(client.is_ok());
    }

    #[tokio::test]
    async fn dial_after_close_fails_without_leaking() {
        let transport = small(4);
        transport.close().unwrap();

        assert_eq!(transport.dial().await.unwrap_err(), TransportError::Closed);
        assert_eq!(transport.open_endpoints(), 0);
    }

    #[tokio::test]
    async fn close_fails_queued_dials() {
        let transport = small(4);
        let dialer = {
            let transport = Arc::clone(&transport);
            tokio::spawn(async move { transport.dial().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(transport.pending(), 1);

        transport.close().unwrap();
        let result = tokio::time::timeout(Duration::from_secs(1), dialer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.unwrap_err(), TransportError::Closed);
        assert_eq!(transport.open_endpoints(), 0);
    }

    #[tokio::test]
    async fn accept_after_close_fails_fast() {
        let transport = small(4);
        assert_eq!(transport.close(), Ok(()));
        assert_eq!(transport.close(), Err(TransportError::AlreadyClosed));
        assert_eq!(transport.accept().await.unwrap_err(), TransportError::Closed);
    }

    #[tokio::test]
    async fn abandoned_dial_is_skipped() {
        let transport = small(4);
        let abandoned = {
            let transport = Arc::clone(&transport);
            tokio::spawn(async move { transport.dial().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        abandoned.abort();
        let _ = abandoned.await;

        let live = {
            let transport = Arc::clone(&transport);
            tokio::spawn(async move { transport.dial().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(transport.pending(), 2);

        // Only the live dial's pair survives the abandoned record.
        let _server = transport.accept().await.unwrap();
        let _client = live.await.unwrap().unwrap();
        assert_eq!(transport.pending(), 0);
        assert_eq!(transport.open_endpoints(), 2);
    }
}
