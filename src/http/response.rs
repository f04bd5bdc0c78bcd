//! Response handling for failed requests.
//!
//! # Responsibilities
//! - Map forward failures to client-facing status codes and JSON bodies
//! - Mark transport failures on the response for the request pipeline
//!
//! # Design Decisions
//! - Downstream error status (>= 400) is reused when the backend answered; otherwise 503
//! - Body shape is always `{ "error": ..., "details"?: ... }`

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::forward::ForwardError;
use crate::routing::LogicalService;

/// Response extension set when a forward failed at the transport level.
#[derive(Debug, Clone)]
pub struct TransportFailure {
    pub service: LogicalService,
    pub error: ForwardError,
}

/// Client-visible gateway errors.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{} service unavailable", .service.display_name())]
    Unavailable {
        service: LogicalService,
        #[source]
        source: ForwardError,
    },

    #[error("invalid JSON body")]
    InvalidBody { cause: String },

    #[error("not found")]
    NotFound,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Unavailable { source, .. } => source
                .backend_status()
                .filter(|s| *s >= 400)
                .and_then(|s| StatusCode::from_u16(s).ok())
                .unwrap_or(StatusCode::SERVICE_UNAVAILABLE),
            GatewayError::InvalidBody { .. } => StatusCode::BAD_REQUEST,
            GatewayError::NotFound => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            error: self.to_string(),
            details: match &self {
                GatewayError::Unavailable { source, .. } => Some(source.cause()),
                GatewayError::InvalidBody { cause } => Some(cause.clone()),
                GatewayError::NotFound => None,
            },
        };

        let mut response = (status, Json(body)).into_response();
        if let GatewayError::Unavailable { service, source } = self {
            response.extensions_mut().insert(TransportFailure {
                service,
                error: source,
            });
        }
        response
    }
}
