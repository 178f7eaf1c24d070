//! Live configuration reload.

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use crate::config::loader::{load_config_with, ConfigError};
use crate::config::validation::validate_config;
use crate::config::{Overrides, ServerConfig};
use crate::server::Server;

#[derive(Debug, Error)]
pub enum ReloadError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{0} cannot be changed by a reload")]
    Unsupported(&'static str),
    #[error("server is shutting down")]
    ShuttingDown,
}

impl Server {
    /// Validate `config` and make it the live configuration.
    ///
    /// Listener, cluster, and pipe settings are fixed for the life of the
    /// process; everything else applies to the next use.
    pub fn reload(&self, config: ServerConfig) -> Result<(), ReloadError> {
        if self.is_shutting_down() {
            return Err(ReloadError::ShuttingDown);
        }
        validate_config(&config).map_err(ConfigError::Validation)?;

        let current = self.config();
        if current.listener != config.listener {
            return Err(ReloadError::Unsupported("listener"));
        }
        if current.cluster != config.cluster {
            return Err(ReloadError::Unsupported("cluster"));
        }
        if current.pipe != config.pipe {
            return Err(ReloadError::Unsupported("pipe"));
        }
        if current.ports_file_dir != config.ports_file_dir {
            return Err(ReloadError::Unsupported("ports_file_dir"));
        }

        self.config.store(Arc::new(config));
        tracing::info!(server_id = %self.id(), "Reloaded server configuration");
        Ok(())
    }

    /// Reload from a TOML file, reapplying the command-line `overrides` the
    /// server was started with.
    pub fn reload_from(&self, path: &Path, overrides: &Overrides) -> Result<(), ReloadError> {
        let config = load_config_with(path, overrides)?;
        self.reload(config)
    }
}
