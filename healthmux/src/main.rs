//! healthmux server.
//!
//! Run with: cargo run --bin healthmux
//! Test with:
//!   - gRPC:  grpcurl -plaintext -import-path proto -proto grpc/health/v1/health.proto \
//!              localhost:50051 grpc.health.v1.Health/Check
//!   - JSON:  curl -X POST -H 'Content-Type: application/json' -d '{}' \
//!              localhost:50051/grpc.health.v1.Health/Watch

use anyhow::Context as _;
use healthmux::{HealthMuxBuilder, ServerConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = ServerConfig::from_env().context("invalid configuration")?;
    let app = HealthMuxBuilder::from_config(&config).build();

    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("failed to bind {}", config.addr))?;
    tracing::info!(
        addr = %listener.local_addr()?,
        watch_updates = config.watch_updates,
        watch_interval = ?config.watch_interval,
        "healthmux listening (grpc, grpc-web, json)"
    );

    healthmux::serve(listener, app, shutdown_signal()).await?;
    tracing::info!("healthmux stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "cannot listen for ctrl-c, running until killed");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
