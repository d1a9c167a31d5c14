//! # ttlock-server
//!
//! Bridge between the TTLock cloud and local consumers.
//!
//! On startup the server loads configuration, registers every lock on the
//! account, starts the poller, and serves the webhook and lock API until
//! Ctrl-C. Pending relock timers are cancelled on shutdown.
//!
//! ## Running
//!
//! ```bash
//! TTLOCK__API__CLIENT_ID=... TTLOCK__API__ACCESS_TOKEN=... cargo run --package ttlock-server
//!
//! # or with a config file
//! TTLOCK_CONFIG=/etc/ttlock-bridge/config.toml ./ttlock-server
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};
use ttlock_core::{BridgeConfig, CommandGate, CoordinatorSettings, HttpGateway, LockRegistry};
use ttlock_server::logging::{self, LogMode};
use ttlock_server::state::AppState;
use ttlock_server::{api, poller};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = BridgeConfig::load(None).context("loading configuration")?;
    config.validate().context("validating configuration")?;

    logging::init(LogMode::from_production_flag(config.server.production))?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting ttlock-server");

    let gateway = HttpGateway::new(&config.api, CommandGate::new())
        .context("building TTLock cloud client")?;
    let settings = CoordinatorSettings::from(&config.locks);
    let registry = Arc::new(LockRegistry::new(Arc::new(gateway), settings));

    match registry.discover().await {
        Ok(ids) => info!(count = ids.len(), "Locks registered"),
        Err(e) => warn!(error = %e, "Lock discovery failed, the poller will retry"),
    }

    let poll_task = poller::spawn(
        Arc::clone(&registry),
        Duration::from_secs(config.locks.poll_interval_secs),
    );

    let app = api::create_router(AppState::new(Arc::clone(&registry), settings.timezone));

    let addr = format!("{}:{}", config.server.bind_address, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    info!(%addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    poll_task.abort();
    registry.shutdown().await;
    info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
