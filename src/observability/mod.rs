//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request (http::pipeline):
//!     → context.rs   (extract or create W3C trace context)
//!     → spans.rs     (root span; child span per forward call)
//!     → logging.rs   (records enriched with trace_id / span_id)
//!     → metrics.rs   (counter + histogram + error counter, once per request)
//!
//! Consumers:
//!     → Log aggregation (stdout JSON)
//!     → Metrics endpoint (Prometheus scrape)
//!     → Span export (structured span events)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Trace context flows explicitly through handler → forwarder → logger
//! - Metrics are cheap (atomic increments)
//! - One `Telemetry` handle set, created at startup, flushed at shutdown

pub mod context;
pub mod logging;
pub mod metrics;
pub mod spans;
pub mod telemetry;

pub use context::{SpanId, TraceContext, TraceFlags, TraceId, TRACEPARENT, TRACESTATE};
pub use logging::{LogLevel, LogRecord, RequestLogger, StructuredLogger};
pub use metrics::{MetricsRecorder, RequestLabels};
pub use spans::{ActiveSpan, SpanExporter, SpanRecord, SpanStatus};
pub use telemetry::{Telemetry, TelemetryCapture};
