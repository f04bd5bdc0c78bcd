//! Telemetry handle set.
//!
//! One explicitly constructed bundle of the process-wide recorder, logger and
//! span exporter. It is cloned into server state and flushed once on exit.

use std::net::SocketAddr;
use std::sync::Arc;

use super::logging::{MemorySink, StructuredLogger, TracingSink};
use super::metrics::{init_prometheus, MetricsRecorder};
use super::spans::{InMemorySpanExporter, LogSpanExporter, SpanExporter};
use crate::config::ObservabilityConfig;

/// Shared observability handles.
#[derive(Clone)]
pub struct Telemetry {
    pub metrics: Arc<MetricsRecorder>,
    pub logger: StructuredLogger,
    pub spans: Arc<dyn SpanExporter>,
}

/// In-memory views onto a [`Telemetry`] built by [`Telemetry::in_memory`].
#[derive(Clone)]
pub struct TelemetryCapture {
    pub metrics: Arc<MetricsRecorder>,
    pub logs: Arc<MemorySink>,
    pub spans: Arc<InMemorySpanExporter>,
}

impl Telemetry {
    /// Production handles: `tracing` sinks plus the Prometheus exporter when enabled.
    ///
    /// Must be called from within a Tokio runtime when metrics are enabled.
    pub fn init(config: &ObservabilityConfig) -> Self {
        if config.metrics_enabled {
            match config.metrics_address.parse::<SocketAddr>() {
                Ok(addr) => init_prometheus(addr),
                Err(_) => tracing::error!(
                    metrics_address = %config.metrics_address,
                    "Failed to parse metrics address"
                ),
            }
        }

        tracing::info!(
            service_name = %config.service_name,
            metrics_enabled = config.metrics_enabled,
            "Telemetry initialized"
        );

        Self::new(
            Arc::new(MetricsRecorder::new()),
            StructuredLogger::new(Arc::new(TracingSink)),
            Arc::new(LogSpanExporter),
        )
    }

    pub fn new(
        metrics: Arc<MetricsRecorder>,
        logger: StructuredLogger,
        spans: Arc<dyn SpanExporter>,
    ) -> Self {
        Self {
            metrics,
            logger,
            spans,
        }
    }

    /// Handles backed entirely by memory, with views for inspection.
    pub fn in_memory() -> (Self, TelemetryCapture) {
        let capture = TelemetryCapture {
            metrics: Arc::new(MetricsRecorder::new()),
            logs: Arc::new(MemorySink::new()),
            spans: Arc::new(InMemorySpanExporter::new()),
        };
        let telemetry = Self::new(
            capture.metrics.clone(),
            StructuredLogger::new(capture.logs.clone()),
            capture.spans.clone(),
        );
        (telemetry, capture)
    }

    /// Flush span and log sinks. Call once, after the server has stopped.
    pub fn shutdown(&self) {
        self.spans.flush();
        self.logger.flush();
        tracing::info!(
            requests = self.metrics.total_requests(),
            errors = self.metrics.total_errors(),
            "Telemetry flushed"
        );
    }
}

impl std::fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Telemetry")
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}
