//! Span lifecycle and export.
//!
//! # Responsibilities
//! - Create spans for proxy operations
//! - Record attributes, status and exceptions while a span is open
//! - Hand finished spans to an exporter exactly once
//!
//! # Design Decisions
//! - `ActiveSpan::end` consumes the span, so it cannot be closed twice
//! - A span dropped without `end` (cancelled future) is closed on drop as an error
//! - Export is fire-and-forget; exporters never fail the request path

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::context::{SpanId, TraceContext, TraceId};

/// Log target used by [`LogSpanExporter`].
pub const SPAN_TARGET: &str = "api_gateway::spans";

/// Final status of a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanStatus {
    Unset,
    Ok,
    Error,
}

/// Attribute value attached to a span.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    String(String),
    Int(i64),
    Bool(bool),
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::String(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Int(value)
    }
}

impl From<u16> for AttributeValue {
    fn from(value: u16) -> Self {
        AttributeValue::Int(i64::from(value))
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

/// A closed, immutable span ready for export.
#[derive(Debug, Clone)]
pub struct SpanRecord {
    pub name: String,
    pub trace_id: TraceId,
    pub span_id: SpanId,
    pub parent_span_id: Option<SpanId>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration: Duration,
    pub attributes: BTreeMap<String, AttributeValue>,
    pub status: SpanStatus,
    pub exception: Option<String>,
}

impl SpanRecord {
    pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }
}

/// Sink for finished spans.
pub trait SpanExporter: Send + Sync + 'static {
    /// Accept one finished span.
    fn export(&self, span: SpanRecord);

    /// Push out anything buffered. Called once at shutdown.
    fn flush(&self) {}
}

/// A span that is still open.
pub struct ActiveSpan {
    name: String,
    context: TraceContext,
    start_time: DateTime<Utc>,
    started: Instant,
    attributes: BTreeMap<String, AttributeValue>,
    status: SpanStatus,
    exception: Option<String>,
    exporter: Arc<dyn SpanExporter>,
    ended: bool,
}

impl ActiveSpan {
    /// Open a span identified by `context`.
    pub fn start(
        name: impl Into<String>,
        context: TraceContext,
        exporter: Arc<dyn SpanExporter>,
    ) -> Self {
        Self {
            name: name.into(),
            context,
            start_time: Utc::now(),
            started: Instant::now(),
            attributes: BTreeMap::new(),
            status: SpanStatus::Unset,
            exception: None,
            exporter,
            ended: false,
        }
    }

    pub fn context(&self) -> &TraceContext {
        &self.context
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        self.attributes.insert(key.into(), value.into());
    }

    /// Mark the span successful.
    pub fn set_ok(&mut self) {
        self.status = SpanStatus::Ok;
    }

    /// Mark the span errored and record the exception message.
    pub fn record_error(&mut self, exception: impl Into<String>) {
        self.status = SpanStatus::Error;
        self.exception = Some(exception.into());
    }

    /// Close the span and export it. An unset status becomes `Ok`.
    pub fn end(mut self) {
        if self.status == SpanStatus::Unset {
            self.status = SpanStatus::Ok;
        }
        self.close();
    }

    fn close(&mut self) {
        if self.ended {
            return;
        }
        self.ended = true;

        let record = SpanRecord {
            name: std::mem::take(&mut self.name),
            trace_id: self.context.trace_id(),
            span_id: self.context.span_id(),
            parent_span_id: self.context.parent_span_id(),
            start_time: self.start_time,
            end_time: Utc::now(),
            duration: self.started.elapsed(),
            attributes: std::mem::take(&mut self.attributes),
            status: self.status,
            exception: self.exception.take(),
        };
        self.exporter.export(record);
    }
}

impl Drop for ActiveSpan {
    fn drop(&mut self) {
        if !self.ended {
            if self.status != SpanStatus::Error {
                self.record_error("cancelled");
            }
            self.close();
        }
    }
}

/// Emits each finished span as a structured log event.
#[derive(Debug, Default)]
pub struct LogSpanExporter;

impl SpanExporter for LogSpanExporter {
    fn export(&self, span: SpanRecord) {
        let attributes = serde_json::to_string(&span.attributes).unwrap_or_default();
        let parent = span.parent_span_id.map(|id| id.to_string());
        tracing::info!(
            target: SPAN_TARGET,
            name = %span.name,
            trace_id = %span.trace_id,
            span_id = %span.span_id,
            parent_span_id = parent.as_deref(),
            start_time = %span.start_time.to_rfc3339(),
            duration_ms = span.duration.as_secs_f64() * 1000.0,
            status = ?span.status,
            exception = span.exception.as_deref(),
            attributes = %attributes,
            "span closed"
        );
    }
}

/// Keeps finished spans in memory, in export order.
#[derive(Debug, Default)]
pub struct InMemorySpanExporter {
    spans: Mutex<Vec<SpanRecord>>,
}

impl InMemorySpanExporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// All spans exported so far.
    pub fn spans(&self) -> Vec<SpanRecord> {
        self.spans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Spans belonging to one trace, in export order.
    pub fn spans_for_trace(&self, trace_id: TraceId) -> Vec<SpanRecord> {
        self.spans()
            .into_iter()
            .filter(|s| s.trace_id == trace_id)
            .collect()
    }
}

impl SpanExporter for InMemorySpanExporter {
    fn export(&self, span: SpanRecord) {
        self.spans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(span);
    }
}
