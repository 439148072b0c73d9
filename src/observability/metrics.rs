//! Metrics collection and exposition.
//!
//! # Metrics
//! - `portmux_connections_total` (counter): accepted connections
//! - `portmux_resolved_total` (counter): classification outcomes by `protocol`
//! - `portmux_client_errors_total` (counter): client errors by `code`
//! - `portmux_messages_total` (counter): delivered messages by `transport`
//! - `portmux_active_connections` (gauge): current connection count

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::sniff::ResolvedType;
use crate::writer::TransportKind;

/// Start the Prometheus scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_connection() {
    ::metrics::counter!("portmux_connections_total").increment(1);
}

pub fn record_resolved(resolved: ResolvedType) {
    ::metrics::counter!("portmux_resolved_total", "protocol" => resolved.as_str()).increment(1);
}

pub fn record_client_error(code: &'static str) {
    ::metrics::counter!("portmux_client_errors_total", "code" => code).increment(1);
}

pub fn record_message(transport: TransportKind) {
    ::metrics::counter!("portmux_messages_total", "transport" => transport.as_str()).increment(1);
}

pub fn set_active_connections(count: u64) {
    ::metrics::gauge!("portmux_active_connections").set(count as f64);
}
