// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.

//! Metrics instrumentation for glowsync.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The embedding process is responsible for choosing the exporter
//! (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `glowsync_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `strategy`: network_first, cache_first, stale_while_revalidate, pass_through
//! - `outcome`: hit, miss, fallback, error
//! - `component`: store, reconciler, ingest, dispatch

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record a routed request and how it was satisfied
pub fn record_route(strategy: &str, outcome: &str) {
    counter!(
        "glowsync_routes_total",
        "strategy" => strategy.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record a component operation result
pub fn record_operation(component: &str, operation: &str, status: &str) {
    counter!(
        "glowsync_operations_total",
        "component" => component.to_string(),
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record operation latency
pub fn record_latency(component: &str, operation: &str, duration: Duration) {
    histogram!(
        "glowsync_operation_seconds",
        "component" => component.to_string(),
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record one push delivery outcome (delivered, gone, failed, timeout)
pub fn record_push_delivery(outcome: &str) {
    counter!(
        "glowsync_push_deliveries_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record entries acknowledged by the backend in one drain
pub fn record_entries_synced(count: usize) {
    counter!("glowsync_entries_synced_total").increment(count as u64);
}

/// Set the number of entries currently pending sync
pub fn set_pending_entries(count: usize) {
    gauge!("glowsync_pending_entries").set(count as f64);
}

/// Set the number of registered push subscriptions
pub fn set_subscriptions(count: usize) {
    gauge!("glowsync_subscriptions").set(count as f64);
}

/// Record cache buckets deleted during a generation rollover
pub fn record_buckets_evicted(count: usize) {
    counter!("glowsync_buckets_evicted_total").increment(count as u64);
}
