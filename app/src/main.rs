//! Raffle reservation worker.
//!
//! Runs the expiry reaper and the inventory reconciler against Redis and
//! `PostgreSQL`, and serves Prometheus metrics.

use anyhow::Context;
use raffle_app::{Config, Worker, connect};
use raffle_runtime::metrics::MetricsServer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine; real deployments set the environment.
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "raffle=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting raffle reservation worker");

    let config = Config::from_env().context("Invalid configuration")?;
    info!(
        redis_url = %config.redis.redacted_url(),
        reservation_ttl_secs = config.reservations.ttl_secs,
        reaper_enabled = config.reaper.enabled,
        reconciler_enabled = config.reconciler.enabled,
        "Configuration loaded"
    );

    let mut metrics = MetricsServer::new(config.metrics.addr);
    if config.metrics.enabled {
        metrics.start().context("Failed to start metrics server")?;
    }

    let app = connect(&config).await.context("Failed to connect backends")?;
    let worker = Worker::start(&app, &config);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received");

    let stragglers = worker.shutdown(config.shutdown_timeout()).await;
    info!(stragglers, "Worker stopped");
    Ok(())
}
