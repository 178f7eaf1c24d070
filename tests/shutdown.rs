//! Graceful shutdown with live connections on every kind of listener.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, DuplexStream};
use tokio::net::TcpStream;

use broker_server::lifecycle::startup;
use broker_server::net::listener::{NetAddr, TransportError};
use broker_server::net::{Category, CloseReason};
use broker_server::server::{Echo, ListenerKind, ServerError};

mod common;
use common::{bounded, dial_echo, local_config, wait_until};

const TCP_CLIENTS: usize = 20;
const PIPE_CLIENTS: usize = 10;
const ROUTES: usize = 10;
const LEAFS: usize = 10;
const TOTAL: usize = TCP_CLIENTS + PIPE_CLIENTS + ROUTES + LEAFS;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shutdown_closes_everything_once() {
    let server = startup::start(local_config(), Arc::new(Echo)).await.unwrap();
    let Some(NetAddr::Tcp(client_addr)) = server.listener_addr(ListenerKind::Client) else {
        panic!("client listener is not a socket");
    };
    let pipe = server.memory_pipe().unwrap();

    let mut sockets = Vec::new();
    for _ in 0..TCP_CLIENTS {
        sockets.push(TcpStream::connect(client_addr).await.unwrap());
    }
    let mut pipes = Vec::new();
    for _ in 0..PIPE_CLIENTS {
        pipes.push(dial_echo(&pipe).await);
    }
    let mut remotes: Vec<DuplexStream> = Vec::new();
    for (category, count) in [(Category::Route, ROUTES), (Category::Leaf, LEAFS)] {
        for i in 0..count {
            let (local, remote) = tokio::io::duplex(1024);
            server
                .spawn_solicited(category, Box::new(local), NetAddr::Memory(format!("{category}-{i}")))
                .unwrap();
            remotes.push(remote);
        }
    }

    wait_until(|| server.registry().total() == TOTAL).await;
    assert_eq!(server.registry().len(Category::Client), TCP_CLIENTS + PIPE_CLIENTS);
    assert_eq!(server.registry().len(Category::Route), ROUTES);
    assert_eq!(server.registry().len(Category::Leaf), LEAFS);
    let tracked: Vec<_> = Category::ALL
        .iter()
        .flat_map(|&category| server.registry().connections(category))
        .collect();
    assert_eq!(tracked.len(), TOTAL);

    // Two callers race on separate worker threads.
    let callers: Vec<_> = (0..2)
        .map(|_| {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.shutdown().await })
        })
        .collect();
    let mut results = Vec::new();
    for caller in callers {
        results.push(bounded(caller).await.unwrap());
    }
    let second = results.pop().unwrap();
    let first = results.pop().unwrap();
    let report = match (first, second) {
        (Some(report), None) | (None, Some(report)) => report,
        other => panic!("expected exactly one report, got {other:?}"),
    };
    assert_eq!(report.listeners_stopped, 2);
    assert_eq!(report.connections_closed, TOTAL);

    assert!(server.is_shutdown_complete());
    assert_eq!(server.active_workers(), 0);
    assert!(server.registry().is_empty());
    for conn in &tracked {
        assert_eq!(conn.close_reason(), Some(CloseReason::ServerShutdown));
        assert!(!conn.is_reconnectable());
    }

    // Peers see the server side go away.
    let mut buf = [0u8; 1];
    for socket in &mut sockets {
        assert!(matches!(bounded(socket.read(&mut buf)).await, Ok(0) | Err(_)));
    }
    for remote in &mut remotes {
        assert_eq!(bounded(remote.read(&mut buf)).await.unwrap(), 0);
    }

    assert_eq!(pipe.dial("pipe", pipe.name()).await.unwrap_err(), TransportError::Closed);
    assert!(TcpStream::connect(client_addr).await.is_err());
    assert!(server.shutdown().await.is_none());
}

#[tokio::test]
async fn nothing_starts_after_shutdown() {
    let server = startup::start(local_config(), Arc::new(Echo)).await.unwrap();
    let pipe = server.memory_pipe().unwrap();
    bounded(server.shutdown()).await.unwrap();

    assert!(server.memory_pipe().is_none());
    assert!(server.active_listeners().is_empty());
    assert_eq!(
        server.start_with_pipe(pipe),
        Err(ServerError::ShuttingDown)
    );
    let (local, _remote) = tokio::io::duplex(64);
    assert_eq!(
        server.spawn_solicited(Category::Route, Box::new(local), NetAddr::Memory("late".into())),
        Err(ServerError::ShuttingDown)
    );
}

#[tokio::test]
async fn waiters_are_released_by_shutdown() {
    let server = startup::start(local_config(), Arc::new(Echo)).await.unwrap();
    let waiter = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.wait_for_shutdown().await })
    };
    assert!(!waiter.is_finished());

    bounded(server.shutdown()).await.unwrap();
    bounded(waiter).await.unwrap();
}
