//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize logging and telemetry from validated configuration
//! - Bind the listener and serve until shutdown
//! - Flush telemetry after the server has drained
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listener binds last (traffic only when telemetry is ready)
//! - Telemetry flush is the final step, after all requests completed

use std::future::Future;

use thiserror::Error;
use tokio::net::TcpListener;

use super::shutdown::Shutdown;
use crate::config::GatewayConfig;
use crate::http::{HttpServer, ServerError};
use crate::observability::logging::init_subscriber;
use crate::observability::Telemetry;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Server(#[from] ServerError),

    #[error("server task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Run the gateway until `stop` resolves, then drain and flush.
pub async fn run<F>(config: GatewayConfig, stop: F) -> Result<(), StartupError>
where
    F: Future<Output = ()>,
{
    init_subscriber(&config.observability);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        claims = %config.services.claims,
        policy = %config.services.policy,
        investment = %config.services.investment,
        chaos = %config.services.chaos,
        "Configuration loaded"
    );

    let telemetry = Telemetry::init(&config.observability);

    let listener = TcpListener::bind(&config.listener.bind_address)
        .await
        .map_err(|source| StartupError::Bind {
            address: config.listener.bind_address.clone(),
            source,
        })?;

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config, telemetry.clone());
    let server_task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    stop.await;
    shutdown.trigger();

    let result = server_task.await;
    telemetry.shutdown();
    result??;

    tracing::info!("Shutdown complete");
    Ok(())
}
