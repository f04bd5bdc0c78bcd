//! End-to-end request flow: forwarding, trace continuation and log correlation.

use api_gateway::observability::metrics::RequestLabels;
use api_gateway::observability::{SpanStatus, TraceContext, TRACEPARENT};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use serde_json::Value;

mod common;

const INCOMING_TRACEPARENT: &str = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";

fn parse_traceparent(value: &str) -> TraceContext {
    let mut headers = HeaderMap::new();
    headers.insert(TRACEPARENT, HeaderValue::from_str(value).unwrap());
    TraceContext::extract(&headers).expect("invalid traceparent")
}

#[tokio::test]
async fn test_create_claim_is_relayed() {
    let (backend, recorded) = common::start_mock_backend(201, r#"{"claimId":"C9"}"#).await;

    let mut config = common::base_config();
    config.services.claims = format!("http://{}", backend);
    let gateway = common::start_gateway(config).await;

    let resp = common::client()
        .post(gateway.url("/api/claims"))
        .header("content-type", "application/json")
        .body(r#"{"policyId":"P1","amount":500}"#)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::CREATED);
    assert!(resp.headers().contains_key(TRACEPARENT));
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["claimId"], "C9");

    let seen = recorded.lock().unwrap()[0].clone();
    assert_eq!(seen.method, "POST");
    assert_eq!(seen.target, "/claims");
    assert_eq!(seen.body, r#"{"policyId":"P1","amount":500}"#);
    assert_eq!(seen.header("content-type"), Some("application/json"));
    assert!(seen.header("traceparent").is_some());

    let labels = RequestLabels::new("POST", "/api/claims", 201);
    assert_eq!(gateway.capture.metrics.request_count(&labels), 1);
    assert_eq!(gateway.capture.metrics.error_count(&labels), 0);
    assert_eq!(gateway.capture.metrics.histogram(&labels).unwrap().count, 1);
}

#[tokio::test]
async fn test_incoming_traceparent_is_continued() {
    let (backend, recorded) = common::start_mock_backend(200, r#"{"customerId":"C42"}"#).await;

    let mut config = common::base_config();
    config.services.policy = format!("http://{}", backend);
    let gateway = common::start_gateway(config).await;

    let resp = common::client()
        .get(gateway.url("/api/policy/C42"))
        .header(TRACEPARENT, INCOMING_TRACEPARENT)
        .header("tracestate", "vendor=abc")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let incoming = parse_traceparent(INCOMING_TRACEPARENT);
    let returned = parse_traceparent(resp.headers()[TRACEPARENT].to_str().unwrap());
    assert_eq!(returned.trace_id(), incoming.trace_id());

    // The backend sees the same trace under a new span.
    let seen = recorded.lock().unwrap()[0].clone();
    let downstream = parse_traceparent(seen.header("traceparent").unwrap());
    assert_eq!(downstream.trace_id(), incoming.trace_id());
    assert_ne!(downstream.span_id(), incoming.span_id());
    assert_ne!(downstream.span_id(), returned.span_id());
    assert_eq!(seen.header("tracestate"), Some("vendor=abc"));

    let spans = gateway.capture.spans.spans_for_trace(incoming.trace_id());
    assert_eq!(spans.len(), 2);
    let forward = spans.iter().find(|s| s.name.starts_with("forward ")).unwrap();
    let root = spans.iter().find(|s| !s.name.starts_with("forward ")).unwrap();

    assert_eq!(root.parent_span_id, Some(incoming.span_id()));
    assert_eq!(forward.parent_span_id, Some(root.span_id));
    assert_eq!(forward.span_id, downstream.span_id());
    assert!(forward.end_time <= root.end_time);
    assert_eq!(root.status, SpanStatus::Ok);
    assert_eq!(forward.status, SpanStatus::Ok);
}

#[tokio::test]
async fn test_completion_is_logged_once_with_trace_id() {
    let (backend, _) = common::start_mock_backend(200, r#"{"enabled":false}"#).await;

    let mut config = common::base_config();
    config.services.chaos = format!("http://{}", backend);
    let gateway = common::start_gateway(config).await;

    let resp = common::client()
        .get(gateway.url("/api/chaos/status"))
        .header(TRACEPARENT, INCOMING_TRACEPARENT)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let trace_id = parse_traceparent(INCOMING_TRACEPARENT).trace_id().to_string();
    let completed = gateway.capture.logs.with_message("request completed");
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].trace_id.as_deref(), Some(trace_id.as_str()));
    assert_eq!(completed[0].fields["status"], 200);
    assert_eq!(completed[0].fields["route"], "/api/chaos/status");

    // Every record emitted for the request carries the same trace id.
    for record in gateway.capture.logs.records() {
        assert_eq!(record.fields["trace_id"], trace_id.as_str());
    }
}

#[tokio::test]
async fn test_malformed_traceparent_starts_new_trace() {
    let (backend, recorded) = common::start_mock_backend(200, "{}").await;

    let mut config = common::base_config();
    config.services.investment = format!("http://{}", backend);
    let gateway = common::start_gateway(config).await;

    let resp = common::client()
        .get(gateway.url("/api/investments/C42"))
        .header(TRACEPARENT, "not-a-traceparent")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let seen = recorded.lock().unwrap()[0].clone();
    let downstream = parse_traceparent(seen.header("traceparent").unwrap());

    let spans = gateway.capture.spans.spans_for_trace(downstream.trace_id());
    let root = spans.iter().find(|s| !s.name.starts_with("forward ")).unwrap();
    assert_eq!(root.parent_span_id, None);
}

#[tokio::test]
async fn test_query_and_request_id_are_forwarded() {
    let (backend, recorded) = common::start_mock_backend(200, "[]").await;

    let mut config = common::base_config();
    config.services.claims = format!("http://{}", backend);
    let gateway = common::start_gateway(config).await;

    let resp = common::client()
        .get(gateway.url("/api/claims?status=open&limit=5"))
        .header("x-request-id", "req-123")
        .header("authorization", "Bearer secret")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["x-request-id"], "req-123");

    let seen = recorded.lock().unwrap()[0].clone();
    assert_eq!(seen.target, "/claims?status=open&limit=5");
    assert_eq!(seen.header("x-request-id"), Some("req-123"));
    assert!(seen.header("authorization").is_none());
}

#[tokio::test]
async fn test_every_route_reaches_its_service() {
    let (claims, claims_seen) = common::start_mock_backend(200, r#"{"service":"claims"}"#).await;
    let (policy, policy_seen) = common::start_mock_backend(200, r#"{"service":"policy"}"#).await;
    let (investment, investment_seen) =
        common::start_mock_backend(200, r#"{"service":"investment"}"#).await;
    let (chaos, chaos_seen) = common::start_mock_backend(200, r#"{"service":"chaos"}"#).await;

    let mut config = common::base_config();
    config.services.claims = format!("http://{}", claims);
    config.services.policy = format!("http://{}", policy);
    config.services.investment = format!("http://{}", investment);
    config.services.chaos = format!("http://{}", chaos);
    let gateway = common::start_gateway(config).await;
    let client = common::client();

    let cases = [
        ("GET", "/api/claims/C1", "claims", "/claims/C1"),
        ("GET", "/api/policy/C42/coverage", "policy", "/policy/C42/coverage"),
        ("GET", "/api/investments/C42", "investment", "/investments/C42"),
        ("POST", "/api/chaos/toggle", "chaos", "/chaos/toggle"),
    ];

    for (method, path, service, _) in cases {
        let request = match method {
            "POST" => client.post(gateway.url(path)),
            _ => client.get(gateway.url(path)),
        };
        let resp = request.send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK, "{} {}", method, path);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["service"], service);
    }

    for (recorded, (method, _, _, target)) in
        [claims_seen, policy_seen, investment_seen, chaos_seen].iter().zip(cases)
    {
        let seen = recorded.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].method, method);
        assert_eq!(seen[0].target, target);
    }
}

#[tokio::test]
async fn test_health_is_served_locally() {
    let gateway = common::start_gateway(common::base_config()).await;

    let resp = common::client()
        .get(gateway.url("/health"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "healthy");

    let labels = RequestLabels::new("GET", "/health", 200);
    assert_eq!(gateway.capture.metrics.request_count(&labels), 1);
    assert_eq!(gateway.capture.spans.spans().len(), 1);
}
