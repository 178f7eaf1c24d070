//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Bind listeners → Start accept loops → Write ports file
//!
//! Shutdown (shutdown.rs):
//!     Close listeners → Fire quit latch → Force-close connections
//!     → Collect accept loop exits → Wait for workers (workers.rs) → Exit
//!
//! Lame duck (lame_duck.rs):
//!     Close client listener → Grace period → Close clients gradually → Shutdown
//!
//! Signals (signals.rs):
//!     SIGINT/SIGTERM → Shutdown
//!     SIGHUP → Config reload
//!     SIGUSR2 → Lame duck
//! ```
//!
//! # Design Decisions
//! - Shutdown is idempotent; only the first caller gets a report
//! - Shutdown has no deadline: it returns once every worker has exited

pub mod lame_duck;
pub mod ports;
pub mod shutdown;
pub mod signals;
pub mod startup;
pub mod workers;

pub use shutdown::{Latch, ShutdownReport};
pub use workers::WorkerGroup;
