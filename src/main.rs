//! API gateway (v1)
//!
//! A single ingress point forwarding requests to the Claims, Policy,
//! Investment and Chaos Controller services, built with Tokio and Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────────────┐
//!                     │                         GATEWAY                          │
//!                     │                                                          │
//!   Client Request    │  ┌─────────┐   ┌──────────────┐   ┌──────────┐           │
//!   ──────────────────┼─▶│  http   │──▶│   pipeline   │──▶│ handlers │           │
//!                     │  │ server  │   │ ctx/span/    │   │ service  │           │
//!                     │  └─────────┘   │ timer        │   │ lookup   │           │
//!                     │                └──────┬───────┘   └────┬─────┘           │
//!                     │                       │                ▼                 │
//!                     │                       │          ┌───────────┐           │
//!   Client Response   │                       │          │ forwarder │──traceparent──▶ Backend
//!   ◀─────────────────┼───────────────────────┘          └───────────┘           │
//!                     │          metrics · structured logs · spans               │
//!                     └──────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use api_gateway::config::{load_config, load_default_config};
use api_gateway::lifecycle::{self, wait_for_shutdown_signal};

#[derive(Parser)]
#[command(name = "api-gateway")]
#[command(about = "Request-forwarding API gateway with trace propagation", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => load_default_config()?,
    };

    lifecycle::run(config, wait_for_shutdown_signal()).await?;
    Ok(())
}
