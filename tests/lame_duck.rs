//! Lame-duck mode: socket clients drained gradually, then full shutdown.

use std::sync::Arc;
use std::time::Instant;

use tokio::net::TcpStream;

use broker_server::lifecycle::startup;
use broker_server::net::listener::{Listener, NetAddr};
use broker_server::net::{Category, CloseReason};
use broker_server::pipe::NamedPipe;
use broker_server::server::{Echo, ListenerKind, ServerError};

mod common;
use common::{bounded, dial_echo, local_config, wait_until};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn drains_clients_then_shuts_down() {
    let mut config = local_config();
    config.lame_duck.duration_ms = 600;
    config.lame_duck.grace_period_ms = 300;
    let duration = config.lame_duck.duration();
    let server = startup::start(config, Arc::new(Echo)).await.unwrap();
    let Some(NetAddr::Tcp(client_addr)) = server.listener_addr(ListenerKind::Client) else {
        panic!("client listener is not a socket");
    };
    let pipe = server.memory_pipe().unwrap();

    let mut sockets = Vec::new();
    for _ in 0..3 {
        sockets.push(TcpStream::connect(client_addr).await.unwrap());
    }
    let _first = dial_echo(&pipe).await;
    wait_until(|| server.registry().len(Category::Client) == 4).await;
    let clients = server.registry().connections(Category::Client);

    let started = Instant::now();
    let lame_duck = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.enter_lame_duck_mode().await })
    };
    wait_until(|| server.is_lame_duck()).await;
    assert!(server.enter_lame_duck_mode().await.is_none());

    // New socket clients are turned away; the pipe keeps serving.
    wait_until(|| server.listener_addr(ListenerKind::Client).is_none()).await;
    assert!(server.active_listeners().contains(&ListenerKind::Pipe));
    let _late = dial_echo(&pipe).await;
    let listener: Arc<dyn Listener> = Arc::new(NamedPipe::new("replacement"));
    assert_eq!(
        server.start_accept_loop(ListenerKind::Client, listener),
        Err(ServerError::LameDuck)
    );

    let report = bounded(lame_duck).await.unwrap().unwrap();
    assert!(started.elapsed() >= duration / 2);
    // The detached client loop does not report; only the pipe does.
    assert_eq!(report.listeners_stopped, 1);

    assert!(server.is_shutdown_complete());
    assert_eq!(server.active_workers(), 0);
    for conn in &clients {
        assert_eq!(conn.close_reason(), Some(CloseReason::ServerShutdown));
    }
}

#[tokio::test]
async fn no_op_after_shutdown() {
    let server = startup::start(local_config(), Arc::new(Echo)).await.unwrap();
    bounded(server.shutdown()).await.unwrap();

    assert!(bounded(server.enter_lame_duck_mode()).await.is_none());
    assert!(!server.is_lame_duck());
}

#[tokio::test]
async fn shutdown_during_grace_period_ends_lame_duck() {
    let mut config = local_config();
    config.lame_duck.duration_ms = 60_000;
    config.lame_duck.grace_period_ms = 30_000;
    let server = startup::start(config, Arc::new(Echo)).await.unwrap();

    let lame_duck = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.enter_lame_duck_mode().await })
    };
    wait_until(|| server.is_lame_duck()).await;

    let report = bounded(server.shutdown()).await.unwrap();
    assert_eq!(report.listeners_stopped, 1);
    // The lame-duck task wakes on quit and finds shutdown already done.
    assert!(bounded(lame_duck).await.unwrap().is_none());
}
