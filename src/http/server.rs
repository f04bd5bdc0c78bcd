//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (request ID, request pipeline, timeout, body limit)
//! - Bind server to listener
//! - Serve until the shutdown signal fires

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use super::handlers;
use super::pipeline::observe_request;
use super::request::{propagate_request_id_layer, set_request_id_layer};
use crate::config::GatewayConfig;
use crate::forward::Forwarder;
use crate::observability::Telemetry;
use crate::routing::ServiceRoutes;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub services: Arc<ServiceRoutes>,
    pub forwarder: Arc<Forwarder>,
    pub service_name: Arc<str>,
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    config: GatewayConfig,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration and telemetry handles.
    pub fn new(config: GatewayConfig, telemetry: Telemetry) -> Self {
        let forwarder = Forwarder::new(
            Duration::from_millis(config.timeouts.forward_ms),
            telemetry.spans.clone(),
        );

        let state = AppState {
            services: Arc::new(ServiceRoutes::from_config(&config.services)),
            forwarder: Arc::new(forwarder),
            service_name: Arc::from(config.observability.service_name.as_str()),
        };

        let router = Self::build_router(&config, state, telemetry);
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, state: AppState, telemetry: Telemetry) -> Router {
        Router::new()
            .route("/api/claims", post(handlers::claims).get(handlers::claims))
            .route("/api/claims/{id}", get(handlers::claims))
            .route("/api/policy/{customer_id}", get(handlers::policy))
            .route("/api/policy/{customer_id}/coverage", get(handlers::policy))
            .route("/api/investments/{customer_id}", get(handlers::investments))
            .route("/api/chaos/status", get(handlers::chaos))
            .route("/api/chaos/toggle", post(handlers::chaos))
            .route("/health", get(handlers::health))
            .fallback(handlers::not_found)
            .with_state(state)
            .layer(DefaultBodyLimit::max(config.listener.max_body_size))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(middleware::from_fn_with_state(telemetry, observe_request))
            .layer(propagate_request_id_layer())
            .layer(set_request_id_layer())
            .layer(TraceLayer::new_for_http())
    }

    /// The fully layered router.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            forward_timeout_ms = self.config.timeouts.forward_ms,
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::metrics::RequestLabels;
    use crate::observability::TRACEPARENT;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn server() -> (HttpServer, crate::observability::TelemetryCapture) {
        let (telemetry, capture) = Telemetry::in_memory();
        let mut config = GatewayConfig::default();
        config.observability.service_name = "gateway-under-test".into();
        (HttpServer::new(config, telemetry), capture)
    }

    #[tokio::test]
    async fn test_health_runs_through_pipeline() {
        let (server, capture) = server();

        let response = server
            .router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(TRACEPARENT));
        assert!(response.headers().contains_key("x-request-id"));

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["service"], "gateway-under-test");

        let labels = RequestLabels::new("GET", "/health", 200);
        assert_eq!(capture.metrics.request_count(&labels), 1);
        assert_eq!(capture.metrics.total_errors(), 0);
    }

    #[tokio::test]
    async fn test_unknown_path_is_metered_as_404() {
        let (server, capture) = server();

        let response = server
            .router()
            .oneshot(Request::get("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let snapshot = capture.metrics.snapshot();
        assert_eq!(snapshot.requests.len(), 1);
        assert_eq!(snapshot.requests[0].0.status, "404");
        assert_eq!(snapshot.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_json_is_rejected_without_forwarding() {
        let (server, capture) = server();

        let response = server
            .router()
            .oneshot(
                Request::post("/api/claims")
                    .header("content-type", "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let labels = RequestLabels::new("POST", "/api/claims", 400);
        assert_eq!(capture.metrics.error_count(&labels), 1);
        // Only the root span: no forward happened.
        assert_eq!(capture.spans.spans().len(), 1);
    }

    #[tokio::test]
    async fn test_request_id_is_preserved() {
        let (server, capture) = server();

        let response = server
            .router()
            .oneshot(
                Request::get("/health")
                    .header("x-request-id", "abc-123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.headers().get("x-request-id").unwrap(), "abc-123");
        let received = capture.logs.with_message("request received");
        assert_eq!(received[0].fields["request_id"], "abc-123");
    }
}
