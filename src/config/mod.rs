//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServerConfig (validated)
//!     → held by the server in an ArcSwap
//!
//! On SIGHUP or file change (watcher.rs):
//!     → loader.rs loads new config, overrides.rs reapplies CLI flags
//!     → Server::reload refuses listener/cluster/pipe changes
//!     → atomic swap of Arc<ServerConfig>
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod overrides;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::ConfigError;
pub use overrides::Overrides;
pub use schema::ServerConfig;
