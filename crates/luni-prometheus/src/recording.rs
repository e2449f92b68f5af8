// SPDX-FileCopyrightText: 2026 Luni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade, so these are no-ops until a recorder is
//! installed.

use std::time::Duration;

use metrics::{describe_counter, describe_gauge, describe_histogram};

/// Register all Luni metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_counter!(
        "luni_store_operations_total",
        "Store operations by operation, backend and outcome"
    );
    describe_histogram!(
        "luni_store_operation_duration_seconds",
        "Store operation latency in seconds"
    );
    describe_counter!(
        "luni_store_fallbacks_total",
        "Times the store ran on the local fallback instead of the remote cache"
    );
    describe_counter!("luni_cache_hits_total", "In-process cache hits");
    describe_counter!("luni_cache_misses_total", "In-process cache misses");
    describe_counter!(
        "luni_cache_evictions_total",
        "In-process cache capacity evictions"
    );
    describe_counter!(
        "luni_remote_connect_attempts_total",
        "Remote cache connection attempts by outcome"
    );
    describe_gauge!(
        "luni_remote_connected",
        "1 while the remote cache connection is up"
    );
}

/// Record one finished store operation.
pub fn record_operation(operation: &'static str, backend: &'static str, ok: bool, elapsed: Duration) {
    let outcome = if ok { "success" } else { "failure" };
    metrics::counter!(
        "luni_store_operations_total",
        "operation" => operation,
        "backend" => backend,
        "outcome" => outcome
    )
    .increment(1);
    metrics::histogram!("luni_store_operation_duration_seconds", "operation" => operation)
        .record(elapsed.as_secs_f64());
}

/// Record that an operation was served by the fallback backend.
pub fn record_fallback() {
    metrics::counter!("luni_store_fallbacks_total").increment(1);
}

pub fn record_cache_hit(domain: &str) {
    metrics::counter!("luni_cache_hits_total", "domain" => domain.to_string()).increment(1);
}

pub fn record_cache_miss(domain: &str) {
    metrics::counter!("luni_cache_misses_total", "domain" => domain.to_string()).increment(1);
}

pub fn record_cache_eviction(domain: &str) {
    metrics::counter!("luni_cache_evictions_total", "domain" => domain.to_string()).increment(1);
}

/// Record a connection attempt and the resulting connection state.
pub fn record_connect_attempt(ok: bool) {
    let outcome = if ok { "success" } else { "failure" };
    metrics::counter!("luni_remote_connect_attempts_total", "outcome" => outcome).increment(1);
    metrics::gauge!("luni_remote_connected").set(if ok { 1.0 } else { 0.0 });
}

/// Mark the remote connection as closed.
pub fn set_remote_disconnected() {
    metrics::gauge!("luni_remote_connected").set(0.0);
}
