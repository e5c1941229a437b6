//! Metrics definitions for the query layer.
//!
//! This module defines all metrics recorded while planning and loading pages.
//! Metrics are collected using the `metrics` crate and can be exported
//! to Prometheus via `metrics-exporter-prometheus`. Without an installed
//! recorder every call is a no-op.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Instant;

/// Initialize all metric descriptions.
/// Call this once at startup before any metrics are recorded.
pub fn init_metrics() {
    describe_counter!(
        "pages_loaded_total",
        "Total number of pages returned to callers"
    );
    describe_counter!(
        "source_fetches_total",
        "Total number of document source fetches by source and outcome"
    );
    describe_counter!(
        "source_fallbacks_total",
        "Total number of fetches retried against the remote source"
    );
    describe_counter!(
        "lookahead_fetches_total",
        "Total number of fetches issued to resolve the next cursor"
    );
    describe_counter!(
        "plans_rejected_total",
        "Total number of predicate sets rejected by the planner"
    );
    describe_histogram!(
        "page_items",
        "Number of items per page after client-side filtering"
    );
    describe_histogram!(
        "fetch_duration_seconds",
        "Time taken by a single document source fetch in seconds"
    );
}

/// Record a page handed to a caller.
///
/// # Arguments
/// * `collection` - The collection the page was read from
/// * `items` - Number of items left after client-side filtering
pub fn record_page_loaded(collection: &str, items: usize) {
    counter!("pages_loaded_total", "collection" => collection.to_string()).increment(1);
    histogram!("page_items", "collection" => collection.to_string()).record(items as f64);
}

/// Record one fetch attempt.
///
/// # Arguments
/// * `source` - "cache" or "remote"
/// * `outcome` - "ok" or "error"
pub fn record_fetch(source: &'static str, outcome: &'static str) {
    counter!("source_fetches_total", "source" => source, "outcome" => outcome).increment(1);
}

/// Record a fallback from the preferred source to the remote source.
pub fn record_source_fallback(collection: &str) {
    counter!("source_fallbacks_total", "collection" => collection.to_string()).increment(1);
}

/// Record a lookahead fetch.
pub fn record_lookahead(collection: &str) {
    counter!("lookahead_fetches_total", "collection" => collection.to_string()).increment(1);
}

/// Record a planner rejection.
pub fn record_plan_rejected() {
    counter!("plans_rejected_total").increment(1);
}

/// A timer that records fetch duration when dropped.
pub struct FetchTimer {
    source: &'static str,
    start: Instant,
}

impl FetchTimer {
    /// Start a new fetch timer for the given source.
    pub fn new(source: &'static str) -> Self {
        Self {
            source,
            start: Instant::now(),
        }
    }
}

impl Drop for FetchTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        histogram!("fetch_duration_seconds", "source" => self.source).record(duration);
    }
}
