//! Per-request observability pipeline.
//!
//! # Lifecycle
//! ```text
//! Received → ContextEstablished → Dispatched → Completed
//! ```
//! - `ContextEstablished`: trace context extracted or created, root span and
//!   timer started, "request received" logged
//! - `Dispatched`: the route handler runs with the context in request extensions
//! - `Completed`: metrics, completion log and root span close, exactly once
//!
//! # Design Decisions
//! - Wraps every route as an axum middleware rather than instrumenting handlers
//! - Labels are built once at completion and shared by all three metric calls
//! - A request dropped mid-flight (client disconnect) still completes, as 499

use std::time::Instant;

use axum::extract::{MatchedPath, Request, State};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use serde_json::json;

use super::request::request_id;
use super::response::TransportFailure;
use crate::observability::logging::{LogLevel, RequestLogger};
use crate::observability::metrics::{RequestLabels, UNMATCHED_ROUTE};
use crate::observability::spans::ActiveSpan;
use crate::observability::{Telemetry, TraceContext, TRACEPARENT};

/// Status recorded when the client went away before a response was produced.
pub const CLIENT_CLOSED_REQUEST: u16 = 499;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Received,
    ContextEstablished,
    Dispatched,
    Completed,
}

/// State of one inbound request between arrival and completion.
pub struct RequestLifecycle {
    telemetry: Telemetry,
    log: RequestLogger,
    root: Option<ActiveSpan>,
    started: Instant,
    method: String,
    route: String,
    path: String,
    request_id: Option<String>,
    phase: Phase,
}

impl RequestLifecycle {
    /// `Received → ContextEstablished`.
    pub fn establish(telemetry: &Telemetry, request: &Request) -> Self {
        let started = Instant::now();
        let method = request.method().to_string();
        let route = request
            .extensions()
            .get::<MatchedPath>()
            .map(|p| p.as_str().to_string())
            .unwrap_or_else(|| UNMATCHED_ROUTE.to_string());
        let path = request.uri().path().to_string();
        let request_id = request_id(request.headers()).map(str::to_string);

        let context = TraceContext::extract_or_create(request.headers());
        let mut root = ActiveSpan::start(
            format!("{} {}", method, route),
            context.clone(),
            telemetry.spans.clone(),
        );
        root.set_attribute("http.method", method.as_str());
        root.set_attribute("http.route", route.as_str());
        root.set_attribute("http.target", path.as_str());

        let log = telemetry.logger.scoped(&context);
        log.info(
            "request received",
            json!({
                "method": method,
                "route": route,
                "path": path,
                "request_id": request_id,
            }),
        );

        let mut lifecycle = Self {
            telemetry: telemetry.clone(),
            log,
            root: Some(root),
            started,
            method,
            route,
            path,
            request_id,
            phase: Phase::Received,
        };
        lifecycle.phase = Phase::ContextEstablished;
        lifecycle
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Context of the root span.
    pub fn context(&self) -> &TraceContext {
        self.log.context()
    }

    pub fn logger(&self) -> &RequestLogger {
        &self.log
    }

    /// `ContextEstablished → Dispatched`.
    pub fn dispatch(&mut self) {
        if self.phase == Phase::ContextEstablished {
            self.phase = Phase::Dispatched;
        }
    }

    /// `Dispatched → Completed` from the response about to be sent.
    pub fn complete(mut self, mut response: Response) -> Response {
        let failure = response.extensions().get::<TransportFailure>().cloned();
        self.finish(response.status().as_u16(), failure.as_ref(), false);

        if let Ok(value) = HeaderValue::from_str(&self.context().traceparent()) {
            response.headers_mut().insert(TRACEPARENT, value);
        }
        response
    }

    fn finish(&mut self, status: u16, failure: Option<&TransportFailure>, client_closed: bool) {
        if self.phase == Phase::Completed {
            return;
        }
        self.phase = Phase::Completed;

        let duration_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        let labels = RequestLabels::new(&self.method, &self.route, status);
        self.telemetry
            .metrics
            .record_completion(&labels, status, duration_ms);

        let level = if status >= 500 {
            LogLevel::Error
        } else if status >= 400 {
            LogLevel::Warn
        } else {
            LogLevel::Info
        };
        self.log.log(
            level,
            "request completed",
            json!({
                "method": labels.method,
                "route": labels.route,
                "path": self.path,
                "status": status,
                "duration_ms": duration_ms,
                "request_id": self.request_id,
                "transport_failure": failure.is_some(),
                "service": failure.map(|f| f.service.name()),
                "cause": failure.map(|f| f.error.cause()),
                "client_closed": client_closed,
            }),
        );

        if let Some(mut root) = self.root.take() {
            root.set_attribute("http.status_code", status);
            match failure {
                Some(f) => root.record_error(f.error.cause()),
                None if client_closed => root.record_error("client closed request"),
                None if status >= 400 => root.record_error(format!("HTTP {}", status)),
                None => root.set_ok(),
            }
            root.end();
        }
    }
}

impl Drop for RequestLifecycle {
    fn drop(&mut self) {
        if self.phase != Phase::Completed {
            self.finish(CLIENT_CLOSED_REQUEST, None, true);
        }
    }
}

/// Middleware wrapping every route with the request lifecycle.
///
/// Handlers find the request's [`RequestLogger`] (and through it the trace
/// context) in request extensions.
pub async fn observe_request(
    State(telemetry): State<Telemetry>,
    mut request: Request,
    next: Next,
) -> Response {
    let mut lifecycle = RequestLifecycle::establish(&telemetry, &request);
    request.extensions_mut().insert(lifecycle.logger().clone());
    lifecycle.dispatch();

    let response = next.run(request).await;
    lifecycle.complete(response)
}
