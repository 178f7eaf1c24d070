//! Command-line settings that take precedence over the config file.
//!
//! Applied at startup and again to every reloaded file, so a reload compares
//! like with like.

use crate::config::schema::ServerConfig;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    /// Client listener address.
    pub listen: Option<String>,
    /// Disable the in-memory pipe.
    pub no_pipe: bool,
}

impl Overrides {
    pub fn apply(&self, config: &mut ServerConfig) {
        if let Some(listen) = &self.listen {
            config.listener.bind_address = listen.clone();
        }
        if self.no_pipe {
            config.pipe.enabled = false;
        }
    }
}
