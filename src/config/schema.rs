//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.
//! Every section has defaults, so an empty file is a valid configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pipe::memory::{TransportOptions, DEFAULT_MAX_ACCEPT_QUEUE, DEFAULT_MAX_PIPE_BUFFER};

/// Root configuration for the broker server.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Human-readable name used in logs. Defaults to the server id.
    pub server_name: Option<String>,

    /// Client socket listener.
    pub listener: ListenerConfig,

    /// Cluster-facing listeners.
    pub cluster: ClusterConfig,

    /// In-memory pipe for in-process clients.
    pub pipe: PipeConfig,

    /// Accept loop error handling.
    pub accept: AcceptConfig,

    /// Lame-duck timings.
    pub lame_duck: LameDuckConfig,

    /// Logging and metrics.
    pub observability: ObservabilityConfig,

    /// Directory for the ports file. No file is written when unset.
    pub ports_file_dir: Option<PathBuf>,
}

/// Client listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:4222").
    pub bind_address: String,

    /// Maximum concurrent client socket connections.
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:4222".to_string(),
            max_connections: 65_536,
        }
    }
}

/// Bind addresses for the server-to-server listeners. Unset means disabled.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ClusterConfig {
    pub routes: Option<String>,
    pub gateways: Option<String>,
    pub leafnodes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct PipeConfig {
    pub enabled: bool,

    /// Name in-process clients dial.
    pub name: String,

    /// Handoffs that may wait for the accept loop before dialers block.
    pub max_accept_queue: usize,

    /// Buffer size of each in-memory connection, in bytes.
    pub max_pipe_buffer: usize,
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            name: "broker".to_string(),
            max_accept_queue: DEFAULT_MAX_ACCEPT_QUEUE,
            max_pipe_buffer: DEFAULT_MAX_PIPE_BUFFER,
        }
    }
}

impl PipeConfig {
    pub fn transport_options(&self) -> TransportOptions {
        TransportOptions {
            max_accept_queue: self.max_accept_queue,
            max_pipe_buffer: self.max_pipe_buffer,
        }
    }
}

/// Backoff bounds for temporary accept errors.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AcceptConfig {
    pub min_sleep_ms: u64,
    pub max_sleep_ms: u64,
}

impl Default for AcceptConfig {
    fn default() -> Self {
        Self {
            min_sleep_ms: 10,
            max_sleep_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LameDuckConfig {
    /// Total time from entering lame duck to shutdown.
    pub duration_ms: u64,

    /// Wait before the first client is closed.
    pub grace_period_ms: u64,
}

impl Default for LameDuckConfig {
    fn default() -> Self {
        Self {
            duration_ms: 120_000,
            grace_period_ms: 10_000,
        }
    }
}

impl LameDuckConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_filter: String,

    /// Colored log output.
    pub ansi: bool,

    /// Enable the Prometheus endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: "broker_server=info".to_string(),
            ansi: true,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
