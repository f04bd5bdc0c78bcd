//! Structured logging.
//!
//! # Responsibilities
//! - Initialize logging subsystem
//! - Build key-value log records enriched with the request's trace identifiers
//! - Hand records to a sink without ever failing the caller
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - JSON format for production, pretty format for development
//! - Log level configurable via config and environment
//! - Trace context is passed explicitly (`StructuredLogger::scoped`), not looked up ambiently

use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use super::context::TraceContext;
use crate::config::{LogFormat, ObservabilityConfig};

/// Log target for records emitted by [`TracingSink`].
pub const ACCESS_TARGET: &str = "api_gateway::access";

/// Install the process-wide `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Calling this twice
/// is harmless; the second call is ignored.
pub fn init_subscriber(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let result = match config.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty().with_target(true))
            .try_init(),
    };

    if let Err(e) = result {
        let _ = writeln!(std::io::stderr(), "logging already initialized: {}", e);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// One structured log line.
#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub fields: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span_id: Option<String>,
}

impl LogRecord {
    fn new(
        level: LogLevel,
        message: &str,
        fields: Value,
        context: Option<&TraceContext>,
    ) -> Self {
        let mut fields = match fields {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };

        let (trace_id, span_id) = match context {
            Some(ctx) => {
                let trace_id = ctx.trace_id().to_string();
                let span_id = ctx.span_id().to_string();
                fields.insert("trace_id".to_string(), Value::String(trace_id.clone()));
                fields.insert("span_id".to_string(), Value::String(span_id.clone()));
                fields.insert("trace_flags".to_string(), Value::String(ctx.flags().to_string()));
                (Some(trace_id), Some(span_id))
            }
            None => (None, None),
        };

        Self {
            timestamp: Utc::now(),
            level,
            message: message.to_string(),
            fields,
            trace_id,
            span_id,
        }
    }
}

#[derive(Debug, Error)]
pub enum LogSinkError {
    #[error("log sink unavailable: {0}")]
    Unavailable(String),

    #[error("failed to encode log record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Destination for log records.
pub trait LogSink: Send + Sync + 'static {
    fn emit(&self, record: &LogRecord) -> Result<(), LogSinkError>;

    fn flush(&self) -> Result<(), LogSinkError> {
        Ok(())
    }
}

/// Emits records as `tracing` events on [`ACCESS_TARGET`].
#[derive(Debug, Default)]
pub struct TracingSink;

macro_rules! emit_event {
    ($level:expr, $record:expr, $fields:expr) => {
        tracing::event!(
            target: ACCESS_TARGET,
            $level,
            trace_id = $record.trace_id.as_deref(),
            span_id = $record.span_id.as_deref(),
            fields = %$fields,
            "{}",
            $record.message
        )
    };
}

impl LogSink for TracingSink {
    fn emit(&self, record: &LogRecord) -> Result<(), LogSinkError> {
        let fields = serde_json::to_string(&record.fields)?;
        match record.level {
            LogLevel::Trace => emit_event!(tracing::Level::TRACE, record, fields),
            LogLevel::Debug => emit_event!(tracing::Level::DEBUG, record, fields),
            LogLevel::Info => emit_event!(tracing::Level::INFO, record, fields),
            LogLevel::Warn => emit_event!(tracing::Level::WARN, record, fields),
            LogLevel::Error => emit_event!(tracing::Level::ERROR, record, fields),
        }
        Ok(())
    }
}

/// Keeps records in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<LogRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Records with the given message, in emission order.
    pub fn with_message(&self, message: &str) -> Vec<LogRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.message == message)
            .collect()
    }
}

impl LogSink for MemorySink {
    fn emit(&self, record: &LogRecord) -> Result<(), LogSinkError> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(())
    }
}

/// Shared handle for emitting structured records.
#[derive(Clone)]
pub struct StructuredLogger {
    sink: Arc<dyn LogSink>,
}

impl StructuredLogger {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self { sink }
    }

    /// Emit one record. Trace fields are added when `context` is given.
    ///
    /// Sink failures fall back to a raw stderr line and are then dropped.
    pub fn log(
        &self,
        context: Option<&TraceContext>,
        level: LogLevel,
        message: &str,
        fields: Value,
    ) {
        let record = LogRecord::new(level, message, fields, context);
        if let Err(e) = self.sink.emit(&record) {
            fallback_write(&record, &e);
        }
    }

    /// Logger bound to one request's trace context.
    pub fn scoped(&self, context: &TraceContext) -> RequestLogger {
        RequestLogger {
            logger: self.clone(),
            context: context.clone(),
        }
    }

    pub fn flush(&self) {
        if let Err(e) = self.sink.flush() {
            let _ = writeln!(std::io::stderr(), "log sink flush failed: {}", e);
        }
    }
}

impl std::fmt::Debug for StructuredLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StructuredLogger").finish_non_exhaustive()
    }
}

fn fallback_write(record: &LogRecord, error: &LogSinkError) {
    let line = serde_json::to_string(record).unwrap_or_else(|_| record.message.clone());
    let _ = writeln!(std::io::stderr(), "{} (log sink error: {})", line, error);
}

/// A [`StructuredLogger`] carrying the active request context.
#[derive(Debug, Clone)]
pub struct RequestLogger {
    logger: StructuredLogger,
    context: TraceContext,
}

impl RequestLogger {
    pub fn context(&self) -> &TraceContext {
        &self.context
    }

    pub fn log(&self, level: LogLevel, message: &str, fields: Value) {
        self.logger.log(Some(&self.context), level, message, fields);
    }

    pub fn info(&self, message: &str, fields: Value) {
        self.log(LogLevel::Info, message, fields);
    }

    pub fn warn(&self, message: &str, fields: Value) {
        self.log(LogLevel::Warn, message, fields);
    }

    pub fn error(&self, message: &str, fields: Value) {
        self.log(LogLevel::Error, message, fields);
    }
}
