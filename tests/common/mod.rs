//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use broker_server::config::ServerConfig;
use broker_server::pipe::{MemoryConn, NamedPipe};

/// Upper bound for any single wait in these tests.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Defaults with every listener on loopback ephemeral ports and short
/// lame-duck timings.
pub fn local_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.observability.ansi = false;
    config.lame_duck.duration_ms = 200;
    config.lame_duck.grace_period_ms = 50;
    config
}

/// Await `fut`, failing the test if it takes longer than [`TEST_TIMEOUT`].
pub async fn bounded<F: Future>(fut: F) -> F::Output {
    tokio::time::timeout(TEST_TIMEOUT, fut)
        .await
        .expect("operation did not finish in time")
}

/// Poll `cond` until it holds.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    bounded(async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
}

/// Dial the pipe and check the echo handler answers.
pub async fn dial_echo(pipe: &Arc<NamedPipe>) -> MemoryConn {
    let mut conn = bounded(pipe.dial("pipe", pipe.name())).await.unwrap();
    conn.write_all(b"PING\r\n").await.unwrap();
    let mut buf = [0u8; 6];
    bounded(conn.read_exact(&mut buf)).await.unwrap();
    assert_eq!(&buf, b"PING\r\n");
    conn
}
