//! Ports file: where this process is listening, for tooling that starts
//! servers on ephemeral ports.

use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::net::listener::NetAddr;
use crate::server::{ListenerKind, Server};

/// Listening URLs by listener kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Ports {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub client: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cluster: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub gateway: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub leafnode: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipe: Option<String>,
}

impl Ports {
    /// Collect the addresses of the server's running listeners.
    pub fn from_server(server: &Server) -> Self {
        let mut ports = Ports::default();
        for kind in server.active_listeners() {
            let Some(addr) = server.listener_addr(kind) else {
                continue;
            };
            let url = match &addr {
                NetAddr::Tcp(socket) => format!("tcp://{socket}"),
                NetAddr::Memory(name) => name.clone(),
            };
            match kind {
                ListenerKind::Client => ports.client.push(url),
                ListenerKind::Route => ports.cluster.push(url),
                ListenerKind::Gateway => ports.gateway.push(url),
                ListenerKind::Leaf => ports.leafnode.push(url),
                ListenerKind::Pipe => ports.pipe = Some(url),
            }
        }
        ports
    }
}

/// `<dir>/broker-server_<pid>.ports`
pub fn ports_file_path(dir: &Path) -> PathBuf {
    dir.join(format!("broker-server_{}.ports", std::process::id()))
}

/// Write `ports` as JSON into `dir`, returning the file path.
pub fn write_ports_file(dir: &Path, ports: &Ports) -> io::Result<PathBuf> {
    let path = ports_file_path(dir);
    let json = serde_json::to_vec_pretty(ports)?;
    std::fs::write(&path, json)?;
    tracing::debug!(path = ?path, "Wrote ports file");
    Ok(path)
}

/// Remove a ports file. A missing file is not an error.
pub fn delete_ports_file(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!(path = ?path, "Removed ports file"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = ?path, error = %e, "Failed to remove ports file"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::ServerConfig;
    use crate::pipe::NamedPipe;
    use crate::server::Echo;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("broker-ports-{name}-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn writes_json_and_deletes() {
        let dir = scratch_dir("write");
        let ports = Ports {
            client: vec!["tcp://127.0.0.1:4222".into()],
            pipe: Some("broker".into()),
            ..Ports::default()
        };

        let path = write_ports_file(&dir, &ports).unwrap();
        assert_eq!(path, ports_file_path(&dir));
        let written: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(written["client"][0], "tcp://127.0.0.1:4222");
        assert_eq!(written["pipe"], "broker");
        assert!(written.get("cluster").is_none());

        delete_ports_file(&path);
        assert!(!path.exists());
        // Second delete is silent.
        delete_ports_file(&path);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn collects_running_listeners() {
        let server = Server::new(ServerConfig::default(), Arc::new(Echo));
        server
            .start_with_pipe(Arc::new(NamedPipe::new("local")))
            .unwrap();

        let ports = Ports::from_server(&server);
        assert_eq!(ports.pipe.as_deref(), Some("local"));
        assert!(ports.client.is_empty());

        server.shutdown().await;
        assert_eq!(Ports::from_server(&server), Ports::default());
    }
}
