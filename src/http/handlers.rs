//! Route handlers.
//!
//! Every `/api/...` route forwards to exactly one logical service. The
//! backend path is the inbound path with the `/api` prefix removed, so
//! `/api/policy/C42/coverage` becomes `{policy}/policy/C42/coverage`.

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, Method, Uri};
use axum::response::Response;
use axum::{Extension, Json};
use serde_json::{json, Value};

use super::response::GatewayError;
use super::server::AppState;
use crate::forward::{ForwardRequest, ForwardResponse};
use crate::observability::RequestLogger;
use crate::routing::LogicalService;

const API_PREFIX: &str = "/api";

pub async fn claims(
    State(state): State<AppState>,
    Extension(log): Extension<RequestLogger>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, GatewayError> {
    relay(&state, &log, LogicalService::Claims, method, &uri, &headers, body).await
}

pub async fn policy(
    State(state): State<AppState>,
    Extension(log): Extension<RequestLogger>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, GatewayError> {
    relay(&state, &log, LogicalService::Policy, method, &uri, &headers, body).await
}

pub async fn investments(
    State(state): State<AppState>,
    Extension(log): Extension<RequestLogger>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, GatewayError> {
    relay(&state, &log, LogicalService::Investment, method, &uri, &headers, body).await
}

pub async fn chaos(
    State(state): State<AppState>,
    Extension(log): Extension<RequestLogger>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, GatewayError> {
    relay(&state, &log, LogicalService::Chaos, method, &uri, &headers, body).await
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": state.service_name.as_ref(),
    }))
}

pub async fn not_found() -> GatewayError {
    GatewayError::NotFound
}

async fn relay(
    state: &AppState,
    log: &RequestLogger,
    service: LogicalService,
    method: Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<Response, GatewayError> {
    let payload = json_payload(body)?;
    let path = upstream_path(uri.path());

    let result = state
        .forwarder
        .forward(
            log.context(),
            ForwardRequest {
                service,
                base_url: state.services.base_url(service),
                path,
                query: uri.query(),
                method,
                payload,
                incoming_headers: headers,
            },
        )
        .await;

    match result {
        Ok(response) => {
            log.info(
                "forward completed",
                json!({
                    "service": service.name(),
                    "upstream_path": path,
                    "status": response.status.as_u16(),
                }),
            );
            Ok(into_response(response))
        }
        Err(e) => {
            log.error(
                "forward failed",
                json!({
                    "service": service.name(),
                    "upstream_path": path,
                    "error_kind": e.kind(),
                    "cause": e.cause(),
                }),
            );
            Err(GatewayError::Unavailable { service, source: e })
        }
    }
}

fn upstream_path(path: &str) -> &str {
    match path.strip_prefix(API_PREFIX) {
        Some(rest) if rest.starts_with('/') => rest,
        _ => path,
    }
}

/// Empty bodies forward nothing; anything else must be JSON.
fn json_payload(body: Bytes) -> Result<Option<Bytes>, GatewayError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice::<serde::de::IgnoredAny>(&body).map_err(|e| {
        GatewayError::InvalidBody {
            cause: e.to_string(),
        }
    })?;
    Ok(Some(body))
}

fn into_response(forwarded: ForwardResponse) -> Response {
    let mut response = Response::new(Body::from(forwarded.body));
    *response.status_mut() = forwarded.status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        forwarded
            .content_type
            .unwrap_or_else(|| HeaderValue::from_static("application/json")),
    );
    response
}
