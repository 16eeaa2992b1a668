//! Portico single-port RPC and REST gateway

use std::{io, process};

use thiserror::Error;
use tokio::{net::TcpListener, sync::watch};
use tracing::{error, info};

use portico_app::context::{AppContext, AppInitError};

use crate::{
    adapters::HttpGateway,
    config::GatewayConfig,
    observability::ObservabilityError,
    router::{ConnectionRouter, RouterError},
    state::State,
};

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod adapters;
mod config;
mod healthcheck;
mod observability;
mod pipeline;
mod router;
mod rpc;
mod shutdown;
mod state;
#[cfg(test)]
mod test_helpers;

#[derive(Debug, Error)]
enum GatewayError {
    #[error("failed to initialise observability")]
    Observability(#[from] ObservabilityError),

    #[error("failed to initialise application context")]
    Init(#[from] AppInitError),

    #[error("failed to bind {addr}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("connection router failed")]
    Router(#[from] RouterError),
}

/// Portico gateway entry point
#[tokio::main]
pub async fn main() {
    // Load configuration from .env and CLI arguments
    let config = GatewayConfig::load().unwrap_or_else(|e| {
        #[expect(
            clippy::print_stderr,
            reason = "logging not initialized yet, must use eprintln for config errors"
        )]
        {
            eprintln!("Configuration error: {e}");
        }

        process::exit(1);
    });

    if let Err(gateway_error) = run(config).await {
        error!(error = ?gateway_error, "gateway failed: {gateway_error}");

        process::exit(1);
    }
}

async fn run(config: GatewayConfig) -> Result<(), GatewayError> {
    observability::init(&config)?;

    // Migrations complete before the listener is bound.
    let app = AppContext::initialize(config.app_settings()).await?;

    let addr = config.socket_addr();

    info!("Starting gateway on {addr}");

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| GatewayError::Bind { addr, source })?;

    let (trigger, shutdown) = watch::channel(false);

    // Listen for shutdown signal
    tokio::spawn(async move {
        if let Err(error) = shutdown::listen(trigger).await {
            error!("failed to listen for shutdown signal: {error}");
        }
    });

    let state = State::from_app_context(
        &app,
        config.default_deadline(),
        config.server.max_body_bytes,
        config.cors_policy(),
    );
    let gateway = HttpGateway::new(state, shutdown.clone());

    let served = ConnectionRouter::new(config.router_config())
        .serve(listener, gateway, shutdown)
        .await;

    app.shutdown().await;

    served?;

    info!("gateway stopped");

    Ok(())
}
