//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, path)
//!     → http::server (axum route table, one handler per endpoint)
//!     → handler picks a LogicalService
//!     → services.rs (LogicalService → base URL)
//!     → forward::Forwarder
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - Each API route maps to exactly one logical service
//! - Deterministic: same input always resolves to the same backend

pub mod services;

pub use services::{LogicalService, ServiceRoutes};
