//! Metrics collection and exposition.
//!
//! # Metrics
//! - `observer_events_total` (counter): feed events by outcome
//!   (`dispatched`, `filtered`, `publisher_error`, `database_error`)
//! - `observer_status_transitions_total` (counter): applied transitions by target status
//! - `observer_restarts_total` (counter): stream restarts by reason
//! - `observer_watched_accounts` (gauge): registry size

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Install the Prometheus exporter and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    let builder = PrometheusBuilder::new().with_http_listener(addr);

    match builder.install() {
        Ok(_) => tracing::info!(address = %addr, "Metrics exporter started"),
        Err(e) => tracing::error!(error = %e, "Failed to start metrics exporter"),
    }
}

pub fn record_event(outcome: &'static str) {
    counter!("observer_events_total", "outcome" => outcome).increment(1);
}

pub fn record_status_transition(to: &'static str) {
    counter!("observer_status_transitions_total", "to" => to).increment(1);
}

pub fn record_restart(reason: &'static str) {
    counter!("observer_restarts_total", "reason" => reason).increment(1);
}

pub fn record_watched_accounts(count: usize) {
    gauge!("observer_watched_accounts").set(count as f64);
}
