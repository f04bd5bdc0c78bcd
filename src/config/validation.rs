//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate service base URLs (parseable, http or https scheme, host present)
//! - Validate value ranges (timeouts > 0, forward deadline inside the request deadline, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::GatewayConfig;
use crate::routing::LogicalService;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address '{value}' is not a socket address")]
    InvalidBindAddress { value: String },

    #[error("services.{service} '{value}' is not a valid URL: {reason}")]
    InvalidServiceUrl {
        service: &'static str,
        value: String,
        reason: String,
    },

    #[error("services.{service} uses unsupported scheme '{scheme}' (http or https)")]
    UnsupportedScheme {
        service: &'static str,
        scheme: String,
    },

    #[error("timeouts.forward_ms must be greater than zero")]
    ZeroForwardTimeout,

    #[error("timeouts.request_secs must be greater than zero")]
    ZeroRequestTimeout,

    #[error("timeouts.forward_ms ({forward_ms}) must be below timeouts.request_secs ({request_secs} s)")]
    ForwardTimeoutExceedsRequestTimeout { forward_ms: u64, request_secs: u64 },

    #[error("listener.max_body_size must be greater than zero")]
    ZeroBodyLimit,

    #[error("observability.metrics_address '{value}' is not a socket address")]
    InvalidMetricsAddress { value: String },
}

/// Check a parsed configuration, collecting every problem found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress {
            value: config.listener.bind_address.clone(),
        });
    }

    if config.listener.max_body_size == 0 {
        errors.push(ValidationError::ZeroBodyLimit);
    }

    for service in LogicalService::ALL {
        let value = service.base_url_in(&config.services);
        if let Err(e) = check_service_url(service.name(), value) {
            errors.push(e);
        }
    }

    if config.timeouts.forward_ms == 0 {
        errors.push(ValidationError::ZeroForwardTimeout);
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroRequestTimeout);
    }

    // The request deadline must not pre-empt the forward deadline, or a hung
    // backend surfaces as 408 instead of a transport failure.
    let forward_ms = config.timeouts.forward_ms;
    let request_secs = config.timeouts.request_secs;
    if forward_ms > 0 && request_secs > 0 && forward_ms >= request_secs.saturating_mul(1000) {
        errors.push(ValidationError::ForwardTimeoutExceedsRequestTimeout {
            forward_ms,
            request_secs,
        });
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress {
            value: config.observability.metrics_address.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_service_url(service: &'static str, value: &str) -> Result<(), ValidationError> {
    let url = Url::parse(value).map_err(|e| ValidationError::InvalidServiceUrl {
        service,
        value: value.to_string(),
        reason: e.to_string(),
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ValidationError::UnsupportedScheme {
            service,
            scheme: url.scheme().to_string(),
        });
    }

    if url.host_str().is_none() {
        return Err(ValidationError::InvalidServiceUrl {
            service,
            value: value.to_string(),
            reason: "missing host".to_string(),
        });
    }

    Ok(())
}
