//! Wiring the production backends and running the background tasks.

use crate::app::RaffleApp;
use crate::config::Config;
use raffle_core::{InventoryLedger, OfferingCatalog, PromotionStore, ReservationError, ReservationStore};
use raffle_postgres::PostgresStore;
use raffle_redis::RedisInventoryLedger;
use raffle_runtime::ReservationEnvironment;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Startup failures.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// `PostgreSQL` unreachable or migrations failed.
    #[error("Durable store setup failed: {0}")]
    Store(#[source] ReservationError),
    /// Redis unreachable.
    #[error("Inventory ledger setup failed: {0}")]
    Ledger(#[source] ReservationError),
}

/// The app on Redis and `PostgreSQL`.
pub type ProductionApp = RaffleApp<RedisInventoryLedger, PostgresStore>;

/// Connect both backends, run migrations if enabled, and build the app.
///
/// # Errors
///
/// Returns [`BootstrapError`] if either backend cannot be reached.
pub async fn connect(config: &Config) -> Result<ProductionApp, BootstrapError> {
    tracing::info!("Connecting to durable store...");
    let store = PostgresStore::connect(&config.postgres.url, config.postgres.max_connections)
        .await
        .map_err(BootstrapError::Store)?;
    if config.postgres.run_migrations {
        store.migrate().await.map_err(BootstrapError::Store)?;
        tracing::info!("Migrations applied");
    }

    tracing::info!("Connecting to inventory ledger...");
    let ledger = RedisInventoryLedger::new(&config.redis.url)
        .await
        .map_err(BootstrapError::Ledger)?
        .with_prefix(config.redis.key_prefix.clone());

    let rate_limiter = Arc::new(ledger.rate_limiter());
    let env =
        ReservationEnvironment::new(Arc::new(ledger), Arc::new(store)).with_rate_limiter(rate_limiter);
    Ok(RaffleApp::new(env, config))
}

/// Background tasks started by [`Worker::start`].
pub struct Worker {
    shutdown: broadcast::Sender<()>,
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl Worker {
    /// Spawn the reaper and the reconciler as enabled in `config`.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn start<L, S>(app: &RaffleApp<L, S>, config: &Config) -> Self
    where
        L: InventoryLedger + 'static,
        S: OfferingCatalog + ReservationStore + PromotionStore + 'static,
    {
        let (shutdown, _) = broadcast::channel(1);
        let mut handles = Vec::new();
        if config.reaper.enabled {
            handles.push(("reaper", app.reaper().spawn(shutdown.subscribe())));
        }
        if config.reconciler.enabled {
            handles.push(("reconciler", app.reconciler().spawn(shutdown.subscribe())));
        }
        tracing::info!(tasks = handles.len(), "Background tasks started");
        Self { shutdown, handles }
    }

    /// Number of running background tasks.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.handles.len()
    }

    /// Signal shutdown and wait up to `timeout` for every task to finish.
    ///
    /// Returns the number of tasks that did not stop in time; those are aborted.
    pub async fn shutdown(self, timeout: Duration) -> usize {
        // No receivers only means every task already exited.
        let _ = self.shutdown.send(());

        let mut stragglers = 0;
        for (name, mut handle) in self.handles {
            match tokio::time::timeout(timeout, &mut handle).await {
                Ok(Ok(())) => tracing::info!(task = name, "Background task stopped"),
                Ok(Err(e)) => tracing::error!(task = name, error = %e, "Background task panicked"),
                Err(_) => {
                    tracing::warn!(task = name, "Background task did not stop in time, aborting");
                    handle.abort();
                    stragglers += 1;
                }
            }
        }
        stragglers
    }
}
