//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Count requests and errors per (method, route, status)
//! - Observe request latency in a fixed-bucket histogram
//! - Mirror every observation to the `metrics` facade for Prometheus
//!
//! # Metrics
//! - `gateway_http_requests_total` (counter): all completed requests
//! - `gateway_http_errors_total` (counter): requests finishing with status >= 400
//! - `gateway_http_request_duration_ms` (histogram): end-to-end latency
//!
//! # Design Decisions
//! - Sharded `DashMap` accumulators; every update is an independent, commutative append
//! - Labels are sanitized, never rejected: losing a metric must not fail a request
//! - Route label is the matched route template to keep cardinality bounded

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use serde::Serialize;

pub const REQUESTS_TOTAL: &str = "gateway_http_requests_total";
pub const ERRORS_TOTAL: &str = "gateway_http_errors_total";
pub const REQUEST_DURATION_MS: &str = "gateway_http_request_duration_ms";

/// Histogram bucket upper bounds in milliseconds.
pub const DURATION_BUCKETS_MS: [f64; 11] = [
    5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0,
];

/// Route label for requests that matched no route.
pub const UNMATCHED_ROUTE: &str = "unmatched";

const UNKNOWN_LABEL: &str = "unknown";
const MAX_LABEL_LEN: usize = 128;

/// Labels shared by all three observations of one request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RequestLabels {
    pub method: String,
    pub route: String,
    pub status: String,
}

impl RequestLabels {
    pub fn new(method: &str, route: &str, status: u16) -> Self {
        Self {
            method: sanitize_label(method),
            route: sanitize_label(route),
            status: status.to_string(),
        }
    }

    fn as_pairs(&self) -> [(&'static str, String); 3] {
        [
            ("method", self.method.clone()),
            ("route", self.route.clone()),
            ("status", self.status.clone()),
        ]
    }
}

/// Coerce a label value into something safe to export.
fn sanitize_label(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.chars().any(|c| c.is_control()) {
        return UNKNOWN_LABEL.to_string();
    }
    trimmed.chars().take(MAX_LABEL_LEN).collect()
}

/// Accumulated histogram state for one label set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramSnapshot {
    pub count: u64,
    pub sum_ms: f64,
    /// Cumulative counts per bucket in [`DURATION_BUCKETS_MS`], plus a final `+Inf` bucket.
    pub buckets: Vec<u64>,
}

impl Default for HistogramSnapshot {
    fn default() -> Self {
        Self {
            count: 0,
            sum_ms: 0.0,
            buckets: vec![0; DURATION_BUCKETS_MS.len() + 1],
        }
    }
}

impl HistogramSnapshot {
    fn observe(&mut self, duration_ms: f64) {
        self.count += 1;
        self.sum_ms += duration_ms;
        for (i, bound) in DURATION_BUCKETS_MS.iter().enumerate() {
            if duration_ms <= *bound {
                self.buckets[i] += 1;
            }
        }
        let inf = self.buckets.len() - 1;
        self.buckets[inf] += 1;
    }
}

/// Point-in-time copy of all accumulators, sorted by labels.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSnapshot {
    pub requests: Vec<(RequestLabels, u64)>,
    pub errors: Vec<(RequestLabels, u64)>,
    pub durations: Vec<(RequestLabels, HistogramSnapshot)>,
}

/// Process-wide request metrics.
#[derive(Debug, Default)]
pub struct MetricsRecorder {
    requests: DashMap<RequestLabels, AtomicU64>,
    errors: DashMap<RequestLabels, AtomicU64>,
    durations: DashMap<RequestLabels, HistogramSnapshot>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment the request counter.
    pub fn record_request(&self, labels: &RequestLabels) {
        increment(&self.requests, labels);
        counter!(REQUESTS_TOTAL, &labels.as_pairs()).increment(1);
    }

    /// Increment the error counter.
    pub fn record_error(&self, labels: &RequestLabels) {
        increment(&self.errors, labels);
        counter!(ERRORS_TOTAL, &labels.as_pairs()).increment(1);
    }

    /// Observe one request duration. Negative or non-finite values count as zero.
    pub fn record_duration(&self, labels: &RequestLabels, duration_ms: f64) {
        let duration_ms = if duration_ms.is_finite() && duration_ms > 0.0 {
            duration_ms
        } else {
            0.0
        };
        self.durations
            .entry(labels.clone())
            .or_default()
            .observe(duration_ms);
        histogram!(REQUEST_DURATION_MS, &labels.as_pairs()).record(duration_ms);
    }

    /// Record a completed request: counter, histogram and, for status >= 400, the error counter.
    pub fn record_completion(&self, labels: &RequestLabels, status: u16, duration_ms: f64) {
        self.record_request(labels);
        if status >= 400 {
            self.record_error(labels);
        }
        self.record_duration(labels, duration_ms);
    }

    pub fn request_count(&self, labels: &RequestLabels) -> u64 {
        read(&self.requests, labels)
    }

    pub fn error_count(&self, labels: &RequestLabels) -> u64 {
        read(&self.errors, labels)
    }

    pub fn histogram(&self, labels: &RequestLabels) -> Option<HistogramSnapshot> {
        self.durations.get(labels).map(|h| h.value().clone())
    }

    pub fn total_requests(&self) -> u64 {
        total(&self.requests)
    }

    pub fn total_errors(&self) -> u64 {
        total(&self.errors)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut snapshot = MetricsSnapshot {
            requests: collect_counters(&self.requests),
            errors: collect_counters(&self.errors),
            durations: self
                .durations
                .iter()
                .map(|e| (e.key().clone(), e.value().clone()))
                .collect(),
        };
        snapshot.durations.sort_by(|a, b| a.0.cmp(&b.0));
        snapshot
    }
}

fn increment(map: &DashMap<RequestLabels, AtomicU64>, labels: &RequestLabels) {
    if let Some(counter) = map.get(labels) {
        counter.fetch_add(1, Ordering::Relaxed);
        return;
    }
    map.entry(labels.clone())
        .or_default()
        .fetch_add(1, Ordering::Relaxed);
}

fn read(map: &DashMap<RequestLabels, AtomicU64>, labels: &RequestLabels) -> u64 {
    map.get(labels)
        .map(|c| c.load(Ordering::Relaxed))
        .unwrap_or(0)
}

fn total(map: &DashMap<RequestLabels, AtomicU64>) -> u64 {
    map.iter().map(|e| e.value().load(Ordering::Relaxed)).sum()
}

fn collect_counters(map: &DashMap<RequestLabels, AtomicU64>) -> Vec<(RequestLabels, u64)> {
    let mut out: Vec<_> = map
        .iter()
        .map(|e| (e.key().clone(), e.value().load(Ordering::Relaxed)))
        .collect();
    out.sort_by(|a, b| a.0.cmp(&b.0));
    out
}

/// Install the Prometheus recorder and its scrape endpoint on `addr`.
///
/// Failure is logged; the gateway keeps serving without an exporter.
pub fn init_prometheus(addr: SocketAddr) {
    let builder = match PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Full(REQUEST_DURATION_MS.to_string()),
            &DURATION_BUCKETS_MS,
        ) {
        Ok(builder) => builder,
        Err(e) => {
            tracing::error!(error = %e, "Invalid Prometheus bucket configuration");
            return;
        }
    };

    match builder.install() {
        Ok(()) => {
            describe_counter!(REQUESTS_TOTAL, "Completed inbound requests");
            describe_counter!(ERRORS_TOTAL, "Completed inbound requests with status >= 400");
            describe_histogram!(
                REQUEST_DURATION_MS,
                Unit::Milliseconds,
                "End-to-end request latency"
            );
            tracing::info!(address = %addr, "Prometheus exporter listening");
        }
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "Failed to install Prometheus exporter");
        }
    }
}
