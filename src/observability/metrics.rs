//! Metrics collection and exposition.
//!
//! # Metrics
//! - `acceptor_connections_accepted_total` (counter): delivered connections by port_index
//! - `acceptor_connections_discarded_total` (counter): accepts dropped during shutdown
//! - `acceptor_accept_errors_total` (counter): failed accepts outside shutdown
//! - `acceptor_rearm_failures_total` (counter): failed attempts to arm the next accept
//! - `acceptor_active_ports` (gauge): listeners with an accept in flight

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its HTTP listener. Needs a tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_connection_accepted(port_index: usize) {
    counter!("acceptor_connections_accepted_total", "port_index" => port_index.to_string())
        .increment(1);
}

pub fn record_connection_discarded() {
    counter!("acceptor_connections_discarded_total").increment(1);
}

pub fn record_accept_error() {
    counter!("acceptor_accept_errors_total").increment(1);
}

pub fn record_rearm_failure() {
    counter!("acceptor_rearm_failures_total").increment(1);
}

pub fn set_active_ports(count: usize) {
    gauge!("acceptor_active_ports").set(count as f64);
}
