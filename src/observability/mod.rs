//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Accept loops, connection workers, lifecycle:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters and gauges via the metrics facade)
//!
//! Consumers:
//!     → stdout (fmt layer, filter from RUST_LOG or config)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Connection ids, listener kinds, and close reasons are log fields, not
//!   interpolated text
//! - Metric updates are no-ops until a recorder is installed

pub mod logging;
pub mod metrics;
