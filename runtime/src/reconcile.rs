//! Ledger seeding, stranded-hold repair and drift detection.
//!
//! The ledger and the durable store are updated in separate round trips, so a
//! failure between them can leave a hold in the ledger after its reservation
//! row has settled, or a hold no row accounts for at all. Each pass:
//!
//! 1. seeds missing ledger entries from the store,
//! 2. settles stranded holds through the token-keyed `commit`/`release`,
//! 3. compares counters and reports what is left as drift.
//!
//! Counters are never overwritten; only the ledger's atomic primitives move them.
//!
//! | Row behind the hold | Action |
//! |---------------------|--------|
//! | `pending` | none |
//! | `confirmed` | `commit` |
//! | `cancelled`, `expired`, `failed` | `release` |
//! | missing | `release`, once seen missing on two consecutive passes |
//!
//! A hold is written before its row is inserted, so a missing row is only
//! trusted once it is still missing a full interval later.

use crate::environment::ReservationEnvironment;
use crate::metrics::SweepMetrics;
use raffle_core::{
    HoldSeed, InventoryLedger, Offering, OfferingCatalog, OfferingId, ReservationError,
    ReservationStatus, ReservationStore, ReservationToken, Result,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Reconciler schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilerConfig {
    /// Time between passes
    pub interval: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
        }
    }
}

/// Ledger counters next to the counters the durable store implies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriftReport {
    /// Offering
    pub offering_id: OfferingId,
    /// Whether this check had to seed the ledger entry
    pub seeded: bool,
    /// Ledger `available`
    pub ledger_available: u32,
    /// Ledger `reserved`
    pub ledger_reserved: u32,
    /// `total - sold - pending` from the store
    pub store_available: u32,
    /// Σ pending quantity from the store
    pub store_reserved: u32,
    /// Stranded holds committed by this check
    pub committed: u32,
    /// Stranded or orphaned holds released by this check
    pub released: u32,
}

impl DriftReport {
    /// Ledger available minus store available. Negative means the ledger is
    /// holding tickets no pending reservation accounts for.
    #[must_use]
    pub fn drift(&self) -> i64 {
        i64::from(self.ledger_available) - i64::from(self.store_available)
    }

    /// Whether both sides agree.
    #[must_use]
    pub const fn is_consistent(&self) -> bool {
        self.ledger_available == self.store_available && self.ledger_reserved == self.store_reserved
    }

    /// Holds settled by this check.
    #[must_use]
    pub const fn repaired(&self) -> u32 {
        self.committed + self.released
    }
}

#[derive(Debug, Default)]
struct Repairs {
    committed: u32,
    released: u32,
}

/// Totals from one pass over the open offerings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Offerings checked
    pub checked: u64,
    /// Ledger entries seeded
    pub seeded: u64,
    /// Stranded holds settled
    pub repaired: u64,
    /// Offerings with drift
    pub drifted: u64,
    /// Offerings that could not be checked
    pub failed: u64,
}

/// Seeds, repairs and checks ledger entries against the durable store.
pub struct InventoryReconciler<L, S> {
    env: ReservationEnvironment<L, S>,
    config: ReconcilerConfig,
    /// Holds seen without a reservation row on the previous pass.
    orphans: Mutex<HashMap<OfferingId, HashSet<ReservationToken>>>,
}

impl<L, S> InventoryReconciler<L, S>
where
    L: InventoryLedger + 'static,
    S: OfferingCatalog + ReservationStore + 'static,
{
    /// Create a reconciler.
    #[must_use]
    pub fn new(env: ReservationEnvironment<L, S>, config: ReconcilerConfig) -> Self {
        Self {
            env,
            config,
            orphans: Mutex::new(HashMap::new()),
        }
    }

    /// Seed the ledger for `offering` if it has no entry.
    ///
    /// # Errors
    ///
    /// Returns `Store` or `LedgerUnavailable` after retries.
    pub async fn bootstrap(&self, offering: &Offering) -> Result<bool> {
        self.env.bootstrap(offering).await
    }

    /// Seed, settle stranded holds, then compare one offering's ledger entry
    /// with the store.
    ///
    /// # Errors
    ///
    /// Returns `Store` or `LedgerUnavailable` after retries.
    pub async fn check(&self, offering: &Offering) -> Result<DriftReport> {
        let seeded = self.bootstrap(offering).await?;
        let repairs = self.repair(offering.id).await?;
        let snapshot = self
            .env
            .retrying("status", || self.env.ledger.status(offering.id))
            .await?
            .ok_or(ReservationError::LedgerNotInitialized(offering.id))?;
        let seed = self
            .env
            .retrying("inventory_seed", || self.env.store.inventory_seed(offering))
            .await?;

        let report = DriftReport {
            offering_id: offering.id,
            seeded,
            ledger_available: snapshot.available,
            ledger_reserved: snapshot.reserved,
            store_available: seed.available(),
            store_reserved: seed.reserved(),
            committed: repairs.committed,
            released: repairs.released,
        };
        SweepMetrics::record_drift(offering.id, report.drift());
        if !report.is_consistent() {
            tracing::warn!(
                offering_id = %offering.id,
                ledger_available = report.ledger_available,
                ledger_reserved = report.ledger_reserved,
                store_available = report.store_available,
                store_reserved = report.store_reserved,
                drift = report.drift(),
                "Inventory drift between ledger and durable store"
            );
        }
        Ok(report)
    }

    async fn repair(&self, offering_id: OfferingId) -> Result<Repairs> {
        let holds = self
            .env
            .retrying("holds", || self.env.ledger.holds(offering_id))
            .await?;
        let suspected = self.orphans().remove(&offering_id).unwrap_or_default();
        let mut missing = HashSet::new();
        let mut repairs = Repairs::default();

        for hold in holds {
            let row = self
                .env
                .retrying("reservation_by_token", || {
                    self.env.store.reservation_by_token(&hold.token)
                })
                .await?;
            let commit = match row.map(|r| r.status) {
                Some(ReservationStatus::Pending) => continue,
                Some(ReservationStatus::Confirmed) => true,
                Some(_) => false,
                None if suspected.contains(&hold.token) => false,
                None => {
                    missing.insert(hold.token);
                    continue;
                }
            };
            if self.settle(offering_id, &hold, commit).await? {
                if commit {
                    repairs.committed += 1;
                } else {
                    repairs.released += 1;
                }
            }
        }

        if !missing.is_empty() {
            tracing::info!(
                offering_id = %offering_id,
                holds = missing.len(),
                "Holds without a reservation row; releasing next pass if still missing"
            );
            self.orphans().insert(offering_id, missing);
        }
        SweepMetrics::record_repair("commit", repairs.committed);
        SweepMetrics::record_repair("release", repairs.released);
        Ok(repairs)
    }

    async fn settle(&self, offering_id: OfferingId, hold: &HoldSeed, commit: bool) -> Result<bool> {
        let settled = if commit {
            self.env
                .retrying("commit", || self.env.ledger.commit(offering_id, &hold.token))
                .await?
        } else {
            self.env
                .retrying("release", || self.env.ledger.release(offering_id, &hold.token))
                .await?
        };
        if settled {
            tracing::warn!(
                offering_id = %offering_id,
                user_id = %hold.user_id,
                quantity = hold.quantity,
                action = if commit { "commit" } else { "release" },
                "Settled stranded ledger hold"
            );
        }
        Ok(settled)
    }

    fn orphans(&self) -> MutexGuard<'_, HashMap<OfferingId, HashSet<ReservationToken>>> {
        self.orphans.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Check every open offering.
    ///
    /// # Errors
    ///
    /// Returns `Store` only if the offerings cannot be listed; per-offering
    /// failures are logged and counted.
    pub async fn run_once(&self) -> Result<ReconcileReport> {
        let offerings = self.env.store.open_offerings(self.env.now()).await?;
        let mut report = ReconcileReport::default();

        for offering in &offerings {
            report.checked += 1;
            match self.check(offering).await {
                Ok(drift) => {
                    report.seeded += u64::from(drift.seeded);
                    report.repaired += u64::from(drift.repaired());
                    report.drifted += u64::from(!drift.is_consistent());
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(offering_id = %offering.id, error = %e, "Reconciliation failed");
                }
            }
        }

        tracing::debug!(
            checked = report.checked,
            seeded = report.seeded,
            repaired = report.repaired,
            drifted = report.drifted,
            failed = report.failed,
            "Reconciliation pass finished"
        );
        Ok(report)
    }

    /// Run passes on the configured interval until `shutdown` fires.
    #[must_use]
    pub fn spawn(self, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::info!("Inventory reconciler started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.run_once().await {
                            tracing::error!(error = %e, "Reconciliation pass failed");
                        }
                    }
                    _ = shutdown.recv() => {
                        tracing::info!("Shutdown signal received");
                        break;
                    }
                }
            }

            tracing::info!("Inventory reconciler stopped");
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use raffle_core::{Reservation, ReservationId, ReserveRequest, UserId};
    use raffle_testing::{InMemoryLedger, InMemoryStore, OfferingBuilder, test_time};
    use std::sync::Arc;

    fn reconciler(
        ledger: &Arc<InMemoryLedger>,
        store: &InMemoryStore,
    ) -> InventoryReconciler<InMemoryLedger, InMemoryStore> {
        let env = ReservationEnvironment::new(Arc::clone(ledger), Arc::new(store.clone()));
        InventoryReconciler::new(env, ReconcilerConfig::default())
    }

    #[tokio::test]
    async fn test_check_seeds_then_reports_consistent() {
        let ledger = Arc::new(InMemoryLedger::new());
        let store = InMemoryStore::new();
        let offering = OfferingBuilder::new(test_time()).total_tickets(20).build();

        let reconciler = reconciler(&ledger, &store);
        let first = reconciler.check(&offering).await.unwrap();
        assert!(first.seeded);
        assert!(first.is_consistent());
        assert_eq!(first.ledger_available, 20);

        let second = reconciler.check(&offering).await.unwrap();
        assert!(!second.seeded);
    }

    #[tokio::test]
    async fn test_orphan_hold_is_released_on_the_second_pass() {
        let ledger = Arc::new(InMemoryLedger::new());
        let store = InMemoryStore::new();
        let offering = OfferingBuilder::new(test_time()).total_tickets(20).build();
        let reconciler = reconciler(&ledger, &store);
        reconciler.bootstrap(&offering).await.unwrap();

        // A hold with no reservation row behind it.
        ledger
            .reserve(&ReserveRequest {
                offering_id: offering.id,
                user_id: UserId::new(),
                quantity: 3,
                token: ReservationToken::generate(),
                limits: offering.limits(),
            })
            .await
            .unwrap();

        let first = reconciler.check(&offering).await.unwrap();
        assert!(!first.is_consistent());
        assert_eq!(first.drift(), -3);
        assert_eq!(first.repaired(), 0);
        assert_eq!(ledger.available_count(offering.id).await.unwrap(), 17);

        let second = reconciler.check(&offering).await.unwrap();
        assert_eq!(second.released, 1);
        assert!(second.is_consistent());
        assert_eq!(ledger.available_count(offering.id).await.unwrap(), 20);
        assert_eq!(ledger.hold_count(offering.id), 0);
    }

    #[tokio::test]
    async fn test_hold_of_a_live_reservation_is_left_alone() {
        let ledger = Arc::new(InMemoryLedger::new());
        let store = InMemoryStore::new();
        let offering = OfferingBuilder::new(test_time()).total_tickets(20).build();
        let reconciler = reconciler(&ledger, &store);
        reconciler.bootstrap(&offering).await.unwrap();

        let row = reservation(&offering, 2);
        ledger.reserve(&hold_request(&offering, &row)).await.unwrap();

        // The row lands between two passes, as `create` inserts after reserving.
        assert_eq!(reconciler.check(&offering).await.unwrap().repaired(), 0);
        store.put_reservation(row);
        let report = reconciler.check(&offering).await.unwrap();
        assert_eq!(report.repaired(), 0);
        assert!(report.is_consistent());
        assert_eq!(ledger.hold_count(offering.id), 1);
    }

    #[tokio::test]
    async fn test_holds_of_settled_rows_are_committed_or_released() {
        let ledger = Arc::new(InMemoryLedger::new());
        let store = InMemoryStore::new();
        let offering = OfferingBuilder::new(test_time()).total_tickets(20).build();
        let reconciler = reconciler(&ledger, &store);
        reconciler.bootstrap(&offering).await.unwrap();

        let mut cancelled = reservation(&offering, 2);
        let pending = reservation(&offering, 1);
        ledger.reserve(&hold_request(&offering, &cancelled)).await.unwrap();
        ledger.reserve(&hold_request(&offering, &pending)).await.unwrap();
        cancelled.status = ReservationStatus::Cancelled;
        store.put_reservation(cancelled);
        store.put_reservation(pending);

        let report = reconciler.check(&offering).await.unwrap();
        assert_eq!((report.committed, report.released), (0, 1));
        assert!(report.is_consistent());
        let snapshot = ledger.status(offering.id).await.unwrap().unwrap();
        assert_eq!((snapshot.available, snapshot.reserved), (19, 1));
    }

    fn reservation(offering: &Offering, quantity: u32) -> Reservation {
        let now = test_time();
        Reservation {
            id: ReservationId::new(),
            offering_id: offering.id,
            user_id: UserId::new(),
            quantity,
            unit_price: offering.ticket_price,
            total_price: offering.ticket_price.checked_multiply(quantity).unwrap(),
            token: ReservationToken::generate(),
            status: ReservationStatus::Pending,
            expires_at: now + chrono::Duration::minutes(5),
            created_at: now,
            updated_at: now,
            processed_at: None,
            payment_transaction_id: None,
            error_message: None,
        }
    }

    fn hold_request(offering: &Offering, row: &Reservation) -> ReserveRequest {
        ReserveRequest {
            offering_id: offering.id,
            user_id: row.user_id,
            quantity: row.quantity,
            token: row.token.clone(),
            limits: offering.limits(),
        }
    }
}
