//! Protocol hand-off for accepted connections.

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::net::connection::Connection;
use crate::net::listener::BoxedStream;

/// Processes one connection once it is registered.
///
/// Returning ends the connection; an error closes it with
/// [`CloseReason::ReadError`](crate::net::CloseReason::ReadError). The server
/// drops the future (and the stream with it) when the connection is closed
/// from outside.
#[async_trait]
pub trait ConnectionHandler: Send + Sync + 'static {
    async fn serve(&self, conn: Arc<Connection>, stream: BoxedStream) -> io::Result<()>;
}

/// Writes every byte back to the peer until EOF.
#[derive(Debug, Clone, Copy, Default)]
pub struct Echo;

#[async_trait]
impl ConnectionHandler for Echo {
    async fn serve(&self, conn: Arc<Connection>, mut stream: BoxedStream) -> io::Result<()> {
        let mut buf = vec![0u8; 4096];
        let mut echoed = 0u64;
        loop {
            let n = stream.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            stream.write_all(&buf[..n]).await?;
            stream.flush().await?;
            echoed += n as u64;
        }
        tracing::trace!(connection_id = %conn.id(), bytes = echoed, "Echo finished");
        Ok(())
    }
}
