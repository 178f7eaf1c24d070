//! Startup orchestration.
//!
//! # Responsibilities
//! - Bind the client listener and any configured cluster listeners
//! - Create the in-memory pipe when enabled
//! - Start one accept loop per listener
//! - Write the ports file
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Everything bound so far is shut down again before an error is returned

use std::io;
use std::sync::Arc;

use thiserror::Error;

use crate::config::ServerConfig;
use crate::lifecycle::ports::{self, Ports};
use crate::net::listener::{ListenerError, SocketListener};
use crate::pipe::NamedPipe;
use crate::server::{ConnectionHandler, ListenerKind, Server, ServerError};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Listener(#[from] ListenerError),
    #[error(transparent)]
    Server(#[from] ServerError),
    #[error("failed to write ports file: {0}")]
    PortsFile(#[source] io::Error),
}

/// Build a server from `config` and start accepting.
pub async fn start(
    config: ServerConfig,
    handler: Arc<dyn ConnectionHandler>,
) -> Result<Arc<Server>, StartupError> {
    let server = Server::new(config, handler);
    match start_listeners(&server).await {
        Ok(()) => {
            let config = server.config();
            tracing::info!(
                server_id = %server.id(),
                server_name = config.server_name.as_deref().unwrap_or_default(),
                listeners = ?server.active_listeners(),
                "Server is ready"
            );
            Ok(server)
        }
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            server.shutdown().await;
            Err(e)
        }
    }
}

async fn start_listeners(server: &Arc<Server>) -> Result<(), StartupError> {
    let config = server.config();

    let client = SocketListener::bind(
        &config.listener.bind_address,
        config.listener.max_connections,
    )
    .await?;
    server.start_accept_loop(ListenerKind::Client, Arc::new(client))?;

    let cluster = [
        (ListenerKind::Route, &config.cluster.routes),
        (ListenerKind::Gateway, &config.cluster.gateways),
        (ListenerKind::Leaf, &config.cluster.leafnodes),
    ];
    for (kind, address) in cluster {
        let Some(address) = address else {
            continue;
        };
        let listener = SocketListener::bind(address, config.listener.max_connections).await?;
        server.start_accept_loop(kind, Arc::new(listener))?;
    }

    if config.pipe.enabled {
        let pipe = NamedPipe::with_options(config.pipe.name.clone(), config.pipe.transport_options());
        server.start_with_pipe(Arc::new(pipe))?;
    }

    if let Some(dir) = &config.ports_file_dir {
        let path = ports::write_ports_file(dir, &Ports::from_server(server))
            .map_err(StartupError::PortsFile)?;
        server.set_ports_file(path);
    }

    Ok(())
}
