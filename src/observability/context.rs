//! Trace context propagation.
//!
//! # Responsibilities
//! - Extract trace context from incoming requests
//! - Generate a fresh context when none (or a malformed one) arrives
//! - Derive child contexts for outbound hops
//! - Inject context into outgoing headers
//!
//! # Design Decisions
//! - W3C Trace Context (`traceparent` + `tracestate`) is the only recognized format
//! - Parsing never fails: anything unrecognized degrades to a new root context
//! - Contexts are immutable values; children are derived, never mutated in place

use std::fmt;

use axum::http::{HeaderMap, HeaderValue};
use rand::Rng;

/// W3C `traceparent` header name.
pub const TRACEPARENT: &str = "traceparent";

/// W3C `tracestate` header name.
pub const TRACESTATE: &str = "tracestate";

/// The only `traceparent` version this gateway emits.
const SUPPORTED_VERSION: &str = "00";

/// Upper bound on `tracestate` members kept from an incoming request.
const MAX_TRACESTATE_ENTRIES: usize = 32;

/// 128-bit trace identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraceId(u128);

impl TraceId {
    /// Generate a random, non-zero trace id.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        loop {
            let id: u128 = rng.gen();
            if id != 0 {
                return Self(id);
            }
        }
    }

    /// Parse 32 lowercase hex characters. All-zero ids are invalid.
    pub fn from_hex(value: &str) -> Option<Self> {
        parse_lower_hex(value, 32)
            .and_then(|v| u128::from_str_radix(v, 16).ok())
            .filter(|id| *id != 0)
            .map(Self)
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// 64-bit span identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpanId(u64);

impl SpanId {
    /// Generate a random, non-zero span id.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        loop {
            let id: u64 = rng.gen();
            if id != 0 {
                return Self(id);
            }
        }
    }

    /// Parse 16 lowercase hex characters. All-zero ids are invalid.
    pub fn from_hex(value: &str) -> Option<Self> {
        parse_lower_hex(value, 16)
            .and_then(|v| u64::from_str_radix(v, 16).ok())
            .filter(|id| *id != 0)
            .map(Self)
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Trace flags byte. Only the `sampled` bit is defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraceFlags(u8);

impl TraceFlags {
    pub const SAMPLED: TraceFlags = TraceFlags(0x01);
    pub const NONE: TraceFlags = TraceFlags(0x00);

    pub fn is_sampled(&self) -> bool {
        self.0 & Self::SAMPLED.0 != 0
    }
}

impl fmt::Display for TraceFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}", self.0)
    }
}

/// Identity of one span inside a trace, plus vendor baggage.
///
/// `parent_span_id` is set when the context continues a remote caller or
/// was derived from a local parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceContext {
    trace_id: TraceId,
    span_id: SpanId,
    parent_span_id: Option<SpanId>,
    flags: TraceFlags,
    baggage: Vec<(String, String)>,
}

impl TraceContext {
    /// Start a brand new sampled trace.
    pub fn new_root() -> Self {
        Self {
            trace_id: TraceId::generate(),
            span_id: SpanId::generate(),
            parent_span_id: None,
            flags: TraceFlags::SAMPLED,
            baggage: Vec::new(),
        }
    }

    /// Parse the remote caller's context from `headers`, if well-formed.
    ///
    /// The returned context describes the *caller's* span.
    pub fn extract(headers: &HeaderMap) -> Option<Self> {
        let traceparent = headers.get(TRACEPARENT)?.to_str().ok()?;
        let mut context = parse_traceparent(traceparent.trim())?;

        if let Some(state) = headers.get(TRACESTATE).and_then(|v| v.to_str().ok()) {
            context.baggage = parse_tracestate(state);
        }

        Some(context)
    }

    /// Context for the gateway's root span of an inbound request.
    ///
    /// A valid incoming `traceparent` is continued (same trace id, caller's
    /// span becomes the parent); otherwise a fresh trace is started.
    pub fn extract_or_create(headers: &HeaderMap) -> Self {
        match Self::extract(headers) {
            Some(remote) => remote.derive_child(),
            None => {
                if headers.contains_key(TRACEPARENT) {
                    tracing::debug!("Ignoring malformed traceparent header");
                }
                Self::new_root()
            }
        }
    }

    /// New context in the same trace with a fresh span id, parented to `self`.
    pub fn derive_child(&self) -> Self {
        Self {
            trace_id: self.trace_id,
            span_id: SpanId::generate(),
            parent_span_id: Some(self.span_id),
            flags: self.flags,
            baggage: self.baggage.clone(),
        }
    }

    /// Copy of `headers` with this context's propagation headers set.
    pub fn inject(&self, headers: &HeaderMap) -> HeaderMap {
        let mut out = headers.clone();
        self.inject_into(&mut out);
        out
    }

    /// Set (or overwrite) the propagation headers in place.
    pub fn inject_into(&self, headers: &mut HeaderMap) {
        if let Ok(value) = HeaderValue::from_str(&self.traceparent()) {
            headers.insert(TRACEPARENT, value);
        }
        if !self.baggage.is_empty() {
            if let Ok(value) = HeaderValue::from_str(&self.tracestate()) {
                headers.insert(TRACESTATE, value);
            }
        }
    }

    /// Serialized `traceparent` value.
    pub fn traceparent(&self) -> String {
        format!(
            "{}-{}-{}-{}",
            SUPPORTED_VERSION, self.trace_id, self.span_id, self.flags
        )
    }

    /// Serialized `tracestate` value (empty when there is no baggage).
    pub fn tracestate(&self) -> String {
        self.baggage
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    pub fn span_id(&self) -> SpanId {
        self.span_id
    }

    pub fn parent_span_id(&self) -> Option<SpanId> {
        self.parent_span_id
    }

    pub fn flags(&self) -> TraceFlags {
        self.flags
    }

    pub fn baggage(&self) -> &[(String, String)] {
        &self.baggage
    }
}

fn parse_lower_hex(value: &str, len: usize) -> Option<&str> {
    let ok = value.len() == len
        && value
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
    ok.then_some(value)
}

fn parse_traceparent(value: &str) -> Option<TraceContext> {
    let parts: Vec<&str> = value.split('-').collect();
    if parts.len() < 4 {
        return None;
    }

    let version = parse_lower_hex(parts[0], 2)?;
    // "ff" is forbidden; version 00 must have exactly four fields.
    if version == "ff" || (version == SUPPORTED_VERSION && parts.len() != 4) {
        return None;
    }

    let trace_id = TraceId::from_hex(parts[1])?;
    let span_id = SpanId::from_hex(parts[2])?;
    let flags = parse_lower_hex(parts[3], 2).and_then(|v| u8::from_str_radix(v, 16).ok())?;

    Some(TraceContext {
        trace_id,
        span_id,
        parent_span_id: None,
        flags: TraceFlags(flags),
        baggage: Vec::new(),
    })
}

fn parse_tracestate(value: &str) -> Vec<(String, String)> {
    value
        .split(',')
        .filter_map(|member| {
            let (key, val) = member.trim().split_once('=')?;
            let (key, val) = (key.trim(), val.trim());
            if key.is_empty() || val.is_empty() {
                return None;
            }
            Some((key.to_string(), val.to_string()))
        })
        .take(MAX_TRACESTATE_ENTRIES)
        .collect()
}
