//! Forwarding subsystem.
//!
//! # Data Flow
//! ```text
//! route handler (http::handlers)
//!     → forwarder.rs (child context, span, header injection)
//!     → backend (single attempt, bounded by timeouts.forward_ms)
//!     → ForwardResponse (status + body, unchanged)
//!       or ForwardError (timeout / connect / transport)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every outbound call has a deadline
//! - No retries, no pooling across replicas
//! - Transport failures are distinct from downstream error statuses

pub mod error;
pub mod forwarder;

pub use error::ForwardError;
pub use forwarder::{ForwardRequest, ForwardResponse, Forwarder, X_REQUEST_ID};
