//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware stack)
//!     → request.rs (request ID assigned / propagated)
//!     → pipeline.rs (trace context, root span, timer; completion bookkeeping)
//!     → handlers.rs (route → logical service → forward::Forwarder)
//!     → response.rs (transport failures → 503 JSON)
//!     → Send to client
//! ```

pub mod handlers;
pub mod pipeline;
pub mod request;
pub mod response;
pub mod server;

pub use pipeline::{observe_request, Phase, RequestLifecycle};
pub use request::X_REQUEST_ID;
pub use response::{GatewayError, TransportFailure};
pub use server::{AppState, HttpServer, ServerError};
