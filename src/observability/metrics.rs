//! Connection metrics.
//!
//! # Metrics
//! - `broker_connections_accepted_total` (counter): by `listener`
//! - `broker_accept_errors_total` (counter): transient accept failures by `listener`
//! - `broker_connections_closed_total` (counter): by `category` and `reason`
//! - `broker_active_connections` (gauge): by `category`

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::net::connection::{Category, CloseReason};
use crate::server::ListenerKind;

/// Install the Prometheus recorder and its scrape endpoint on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn connection_accepted(kind: ListenerKind) {
    counter!("broker_connections_accepted_total", "listener" => kind.as_str()).increment(1);
}

pub fn accept_error(kind: ListenerKind) {
    counter!("broker_accept_errors_total", "listener" => kind.as_str()).increment(1);
}

pub fn connection_opened(category: Category) {
    gauge!("broker_active_connections", "category" => category.as_str()).increment(1.0);
}

pub fn connection_closed(category: Category, reason: CloseReason) {
    gauge!("broker_active_connections", "category" => category.as_str()).decrement(1.0);
    counter!(
        "broker_connections_closed_total",
        "category" => category.as_str(),
        "reason" => reason.as_str()
    )
    .increment(1);
}
