//! Periodic sweep that reclaims inventory from abandoned reservations.
//!
//! Each sweep fetches pending reservations past their expiry in bounded
//! batches and claims them `pending → expired`. The claim is guarded on
//! `expires_at <= now`, so any number of reapers (and concurrent payment
//! signals) can run against the same store: whoever loses the claim skips the
//! row. A row that fails to expire is left out of the sweep's later batches
//! so it cannot hide the rows behind it; the next sweep retries it.

use crate::environment::ReservationEnvironment;
use crate::metrics::SweepMetrics;
use raffle_core::{
    Claim, ClaimOutcome, InventoryLedger, PromotionStore, Reservation, ReservationStore, Result,
};
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Reaper schedule and batch bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaperConfig {
    /// Time between sweeps
    pub interval: Duration,
    /// Rows fetched per batch
    pub batch_size: u32,
    /// Batches per sweep; the rest waits for the next tick
    pub max_batches: u32,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            batch_size: 100,
            max_batches: 10,
        }
    }
}

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapReport {
    /// Expired rows seen
    pub scanned: u64,
    /// Rows this sweep expired
    pub expired: u64,
    /// Rows someone else settled first
    pub skipped: u64,
    /// Rows that errored
    pub failed: u64,
}

/// Expires pending reservations whose hold ran out.
pub struct ExpiryReaper<L, S> {
    env: ReservationEnvironment<L, S>,
    config: ReaperConfig,
}

impl<L, S> ExpiryReaper<L, S>
where
    L: InventoryLedger + 'static,
    S: ReservationStore + PromotionStore + 'static,
{
    /// Create a reaper.
    #[must_use]
    pub const fn new(env: ReservationEnvironment<L, S>, config: ReaperConfig) -> Self {
        Self { env, config }
    }

    /// Run one sweep.
    ///
    /// # Errors
    ///
    /// Returns `Store` only if fetching a batch fails; per-row failures are
    /// logged and counted in the report.
    pub async fn run_once(&self) -> Result<ReapReport> {
        let started = Instant::now();
        let now = self.env.now();
        let mut report = ReapReport::default();

        let mut failed = HashSet::new();
        for _ in 0..self.config.max_batches {
            // Failed rows are still pending and expired; fetch past them.
            let limit = self
                .config
                .batch_size
                .saturating_add(u32::try_from(failed.len()).unwrap_or(u32::MAX));
            let fetched = self.env.store.expired_pending(now, limit).await?;
            let exhausted = fetched.len() < limit as usize;
            let batch: Vec<Reservation> = fetched
                .into_iter()
                .filter(|r| !failed.contains(&r.id))
                .collect();
            if batch.is_empty() {
                break;
            }

            for reservation in batch {
                report.scanned += 1;
                match self.expire(&reservation, now).await {
                    Ok(true) => report.expired += 1,
                    Ok(false) => report.skipped += 1,
                    Err(e) => {
                        report.failed += 1;
                        failed.insert(reservation.id);
                        tracing::warn!(
                            reservation_id = %reservation.id,
                            error = %e,
                            "Failed to expire reservation"
                        );
                    }
                }
            }

            if exhausted {
                break;
            }
        }

        SweepMetrics::record_reap(report.expired, report.failed, started.elapsed());
        if report.expired > 0 || report.failed > 0 {
            tracing::info!(
                scanned = report.scanned,
                expired = report.expired,
                skipped = report.skipped,
                failed = report.failed,
                "Reaper sweep finished"
            );
        }
        Ok(report)
    }

    async fn expire(&self, reservation: &Reservation, now: chrono::DateTime<chrono::Utc>) -> Result<bool> {
        match self
            .env
            .store
            .claim(reservation.id, &Claim::expire(now, None))
            .await?
        {
            ClaimOutcome::Claimed(expired) => {
                tracing::debug!(
                    reservation_id = %expired.id,
                    quantity = expired.quantity,
                    "Reservation expired"
                );
                self.env.settle_claimed(&expired).await;
                Ok(true)
            }
            ClaimOutcome::Lost(_) | ClaimOutcome::NotFound => Ok(false),
        }
    }

    /// Run sweeps on the configured interval until `shutdown` fires.
    #[must_use]
    pub fn spawn(self, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::info!(
                interval_ms = u64::try_from(self.config.interval.as_millis()).unwrap_or(u64::MAX),
                batch_size = self.config.batch_size,
                "Expiry reaper started"
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.run_once().await {
                            tracing::error!(error = %e, "Reaper sweep failed");
                        }
                    }
                    _ = shutdown.recv() => {
                        tracing::info!("Shutdown signal received");
                        break;
                    }
                }
            }

            tracing::info!("Expiry reaper stopped");
        })
    }
}
