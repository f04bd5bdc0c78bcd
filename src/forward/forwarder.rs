//! Outbound forwarding with trace propagation.
//!
//! # Responsibilities
//! - Derive a child trace context and open a `forward {path}` span
//! - Build the outgoing request from a minimal header set plus `traceparent`
//! - Enforce the forward deadline over connect, response and body read
//! - Classify transport failures; relay any backend status unchanged
//!
//! # Design Decisions
//! - http and https backends share one pooled client (rustls, webpki roots)
//! - Single attempt; retries are left to callers
//! - The span is closed exactly once on every exit path, including cancellation
//! - Downstream 4xx/5xx is a successful forward at this layer

use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderValue, Method, Request, StatusCode, Uri};
use hyper::body::Incoming;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use super::error::{describe, ForwardError};
use crate::observability::spans::{ActiveSpan, SpanExporter};
use crate::observability::TraceContext;
use crate::routing::LogicalService;

/// Request ID header copied onto outbound calls.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Largest backend response body the gateway will buffer.
const MAX_RESPONSE_BYTES: usize = 16 * 1024 * 1024;

const APPLICATION_JSON: &str = "application/json";

/// One outbound call.
#[derive(Debug)]
pub struct ForwardRequest<'a> {
    pub service: LogicalService,
    pub base_url: &'a str,
    pub path: &'a str,
    pub query: Option<&'a str>,
    pub method: Method,
    pub payload: Option<Bytes>,
    pub incoming_headers: &'a HeaderMap,
}

/// What the backend answered, relayed as-is.
#[derive(Debug, Clone)]
pub struct ForwardResponse {
    pub status: StatusCode,
    pub content_type: Option<HeaderValue>,
    pub body: Bytes,
}

/// HTTP(S) client for backend calls.
pub struct Forwarder {
    client: Client<HttpsConnector<HttpConnector>, Body>,
    timeout: Duration,
    spans: Arc<dyn SpanExporter>,
}

impl Forwarder {
    pub fn new(timeout: Duration, spans: Arc<dyn SpanExporter>) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_nodelay(true);
        connector.set_connect_timeout(Some(timeout));
        connector.enforce_http(false);

        let https = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .wrap_connector(connector);

        let client = Client::builder(TokioExecutor::new()).build(https);

        Self {
            client,
            timeout,
            spans,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Forward `request` as a child of `parent`.
    pub async fn forward(
        &self,
        parent: &TraceContext,
        request: ForwardRequest<'_>,
    ) -> Result<ForwardResponse, ForwardError> {
        let child = parent.derive_child();
        let mut span = ActiveSpan::start(
            format!("forward {}", request.path),
            child.clone(),
            self.spans.clone(),
        );
        span.set_attribute("http.method", request.method.as_str());
        span.set_attribute("peer.service", request.service.name());

        let result = match build_uri(request.base_url, request.path, request.query) {
            Ok(uri) => {
                span.set_attribute("http.url", uri.to_string());
                let headers = outgoing_headers(
                    &child,
                    request.incoming_headers,
                    request.payload.is_some(),
                );
                self.send_with_deadline(uri, request.method, headers, request.payload)
                    .await
            }
            Err(e) => Err(e),
        };

        match &result {
            Ok(response) => {
                span.set_attribute("http.status_code", response.status.as_u16());
                span.set_ok();
            }
            Err(e) => {
                span.set_attribute("error.kind", e.kind());
                span.record_error(e.cause());
            }
        }
        span.end();

        result
    }

    async fn send_with_deadline(
        &self,
        uri: Uri,
        method: Method,
        headers: HeaderMap,
        payload: Option<Bytes>,
    ) -> Result<ForwardResponse, ForwardError> {
        match tokio::time::timeout(self.timeout, self.send(uri, method, headers, payload)).await {
            Ok(result) => result,
            Err(_) => Err(ForwardError::Timeout {
                after_ms: self.timeout.as_millis() as u64,
            }),
        }
    }

    async fn send(
        &self,
        uri: Uri,
        method: Method,
        headers: HeaderMap,
        payload: Option<Bytes>,
    ) -> Result<ForwardResponse, ForwardError> {
        let body = payload.map(Body::from).unwrap_or_else(Body::empty);
        let mut request = Request::builder()
            .method(method)
            .uri(uri)
            .body(body)
            .map_err(|e| ForwardError::InvalidTarget {
                cause: e.to_string(),
            })?;
        *request.headers_mut() = headers;

        let response: hyper::Response<Incoming> = self.client.request(request).await.map_err(|e| {
            if e.is_connect() {
                ForwardError::Connect { cause: describe(&e) }
            } else {
                ForwardError::Transport { cause: describe(&e) }
            }
        })?;

        let status = response.status();
        let content_type = response.headers().get(header::CONTENT_TYPE).cloned();
        let body = axum::body::to_bytes(Body::new(response.into_body()), MAX_RESPONSE_BYTES)
            .await
            .map_err(|e| ForwardError::ResponseBody {
                cause: describe(&e),
                backend_status: status.as_u16(),
            })?;

        Ok(ForwardResponse {
            status,
            content_type,
            body,
        })
    }
}

impl std::fmt::Debug for Forwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Forwarder")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// `base_url + path (+ ?query)` as a URI.
fn build_uri(base_url: &str, path: &str, query: Option<&str>) -> Result<Uri, ForwardError> {
    let base = base_url.trim_end_matches('/');
    let mut target = if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    };
    if let Some(q) = query.filter(|q| !q.is_empty()) {
        target.push('?');
        target.push_str(q);
    }

    target
        .parse::<Uri>()
        .map_err(|e| ForwardError::InvalidTarget {
            cause: format!("{}: {}", target, e),
        })
}

/// Minimal outgoing header set with the child context injected.
fn outgoing_headers(child: &TraceContext, incoming: &HeaderMap, has_payload: bool) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::ACCEPT, HeaderValue::from_static(APPLICATION_JSON));

    if has_payload {
        let content_type = incoming
            .get(header::CONTENT_TYPE)
            .cloned()
            .unwrap_or_else(|| HeaderValue::from_static(APPLICATION_JSON));
        headers.insert(header::CONTENT_TYPE, content_type);
    }

    if let Some(request_id) = incoming.get(X_REQUEST_ID) {
        headers.insert(X_REQUEST_ID, request_id.clone());
    }

    child.inject(&headers)
}
