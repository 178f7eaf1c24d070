//! Config file watcher for `--watch`.
//!
//! Each write to the file produces a freshly loaded, overridden, and
//! validated [`ServerConfig`] on the update channel. Files that fail to load
//! are logged and skipped; the server keeps its current configuration.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config_with;
use crate::config::overrides::Overrides;
use crate::config::schema::ServerConfig;

/// Poll interval for backends without native change events.
const POLL_INTERVAL: Duration = Duration::from_secs(2);

pub struct ConfigWatcher {
    source: Arc<WatchedFile>,
}

struct WatchedFile {
    path: PathBuf,
    overrides: Overrides,
    updates: mpsc::UnboundedSender<ServerConfig>,
}

impl WatchedFile {
    fn on_event(&self, res: notify::Result<Event>) {
        let event = match res {
            Ok(event) => event,
            Err(e) => {
                tracing::error!(path = ?self.path, error = ?e, "Config watch error");
                return;
            }
        };
        if !(event.kind.is_modify() || event.kind.is_create()) {
            return;
        }

        tracing::info!(path = ?self.path, "Config file changed");
        match load_config_with(&self.path, &self.overrides) {
            Ok(config) => {
                // The receiver is gone only once the process is exiting.
                let _ = self.updates.send(config);
            }
            Err(e) => {
                tracing::error!(path = ?self.path, error = %e, "Ignoring config change");
            }
        }
    }
}

impl ConfigWatcher {
    /// Returns the watcher and the receiving end of its update channel.
    pub fn new(path: &Path, overrides: Overrides) -> (Self, mpsc::UnboundedReceiver<ServerConfig>) {
        let (updates, rx) = mpsc::unbounded_channel();
        let source = Arc::new(WatchedFile {
            path: path.to_path_buf(),
            overrides,
            updates,
        });
        (Self { source }, rx)
    }

    /// Start watching. Watching stops when the returned handle is dropped.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let source = Arc::clone(&self.source);
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| source.on_event(res),
            Config::default().with_poll_interval(POLL_INTERVAL),
        )?;
        watcher.watch(&self.source.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.source.path, "Config watcher started");
        Ok(watcher)
    }
}
