//! Metrics collection and exposition.
//!
//! # Metrics
//! - `prerender_decisions_total` (counter): classifier verdicts by `eligible`
//! - `prerender_cache_hits_total` (counter): answers served by the cache hook
//! - `prerender_renders_total` (counter): rendering service responses by `status`
//! - `prerender_render_failures_total` (counter): failed fetches by `kind`
//! - `prerender_render_duration_seconds` (histogram): rendering service latency
//!
//! Without an installed recorder every call here is a no-op.

use std::net::SocketAddr;
use std::time::Instant;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    let builder = PrometheusBuilder::new().with_http_listener(addr);
    match builder.install() {
        Ok(()) => {
            describe();
            tracing::info!(address = %addr, "Metrics endpoint listening");
        }
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "Failed to install Prometheus exporter");
        }
    }
}

fn describe() {
    describe_counter!("prerender_decisions_total", "Classifier verdicts");
    describe_counter!("prerender_cache_hits_total", "Requests answered by the cache hook");
    describe_counter!("prerender_renders_total", "Responses received from the rendering service");
    describe_counter!("prerender_render_failures_total", "Failed rendering service fetches");
    describe_histogram!(
        "prerender_render_duration_seconds",
        "Time spent waiting on the rendering service"
    );
}

pub fn record_decision(eligible: bool) {
    let label = if eligible { "true" } else { "false" };
    counter!("prerender_decisions_total", "eligible" => label).increment(1);
}

pub fn record_cache_hit() {
    counter!("prerender_cache_hits_total").increment(1);
}

/// Record a completed fetch and how long it took since `start`.
pub fn record_render(status: u16, start: Instant) {
    counter!("prerender_renders_total", "status" => status.to_string()).increment(1);
    histogram!("prerender_render_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_render_failure(kind: &'static str, start: Instant) {
    counter!("prerender_render_failures_total", "kind" => kind).increment(1);
    histogram!("prerender_render_duration_seconds").record(start.elapsed().as_secs_f64());
}
