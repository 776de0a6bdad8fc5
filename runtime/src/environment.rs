//! Dependencies shared by the reservation services.

use crate::metrics::ReservationMetrics;
use crate::notifications::TracingNotifier;
use crate::retry::{RetryPolicy, retry_transient};
use chrono::{DateTime, Utc};
use raffle_core::{
    Clock, InventoryChange, InventoryLedger, NotificationSink, Offering, PromotionStore,
    PromotionUsageStatus, RateLimiter, Reservation, ReservationEvent, ReservationStatus,
    ReservationStore, Result, SystemClock, Unlimited,
};
use std::future::Future;
use std::sync::Arc;

/// Ledger, store, clock, sink, rate limiter and retry policy, shared by every
/// service.
///
/// Cloning is cheap; all clones talk to the same backends.
pub struct ReservationEnvironment<L, S> {
    /// Inventory ledger
    pub ledger: Arc<L>,
    /// Durable store
    pub store: Arc<S>,
    /// Time source
    pub clock: Arc<dyn Clock>,
    /// Event outlet
    pub notifier: Arc<dyn NotificationSink>,
    /// Reservation rate windows
    pub rate_limiter: Arc<dyn RateLimiter>,
    /// Backoff for transient ledger failures
    pub retry: RetryPolicy,
}

impl<L, S> Clone for ReservationEnvironment<L, S> {
    fn clone(&self) -> Self {
        Self {
            ledger: Arc::clone(&self.ledger),
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            notifier: Arc::clone(&self.notifier),
            rate_limiter: Arc::clone(&self.rate_limiter),
            retry: self.retry,
        }
    }
}

impl<L, S> ReservationEnvironment<L, S> {
    /// Environment with the system clock, a tracing sink, no rate limiter
    /// and default retries.
    #[must_use]
    pub fn new(ledger: Arc<L>, store: Arc<S>) -> Self {
        Self {
            ledger,
            store,
            clock: Arc::new(SystemClock),
            notifier: Arc::new(TracingNotifier),
            rate_limiter: Arc::new(Unlimited),
            retry: RetryPolicy::default(),
        }
    }

    /// Replace the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the notification sink.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Replace the rate limiter.
    #[must_use]
    pub fn with_rate_limiter(mut self, rate_limiter: Arc<dyn RateLimiter>) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    /// Replace the retry policy.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(crate) async fn retrying<F, Fut, T>(&self, operation: &'static str, f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        retry_transient(self.retry, operation, f).await
    }

    pub(crate) fn publish_status(&self, reservation: &Reservation, from: Option<ReservationStatus>) {
        self.notifier.notify(ReservationEvent::StatusChanged {
            reservation_id: reservation.id,
            offering_id: reservation.offering_id,
            user_id: reservation.user_id,
            from,
            to: reservation.status,
            at: reservation.updated_at,
        });
    }

    pub(crate) fn publish_inventory(&self, reservation: &Reservation, change: InventoryChange) {
        self.notifier.notify(ReservationEvent::InventoryChanged {
            offering_id: reservation.offering_id,
            change,
            at: self.now(),
        });
    }
}

impl<L, S> ReservationEnvironment<L, S>
where
    L: InventoryLedger,
    S: ReservationStore,
{
    /// Seed the ledger entry for `offering` from the durable store if absent.
    ///
    /// Returns `true` if this call created the entry.
    ///
    /// # Errors
    ///
    /// Returns `Store` or `LedgerUnavailable` after retries.
    pub async fn bootstrap(&self, offering: &Offering) -> Result<bool> {
        let seed = self
            .retrying("inventory_seed", || self.store.inventory_seed(offering))
            .await?;
        let created = self
            .retrying("initialize", || self.ledger.initialize(offering.id, &seed))
            .await?;
        if created {
            tracing::info!(
                offering_id = %offering.id,
                total = seed.total,
                sold = seed.sold,
                reserved = seed.reserved(),
                "Inventory ledger seeded from durable store"
            );
        }
        Ok(created)
    }
}

impl<L, S> ReservationEnvironment<L, S>
where
    L: InventoryLedger,
    S: PromotionStore,
{
    /// Settle a reservation this caller just claimed out of `pending` (into
    /// cancelled, expired or failed): release its hold, reverse its pending
    /// promotion usage, and publish the transition.
    ///
    /// The claim is already durable, so failures here are logged rather than
    /// returned. A hold that cannot be released stays reserved until the
    /// reconciler finds it behind a settled row.
    pub(crate) async fn settle_claimed(&self, reservation: &Reservation) {
        ReservationMetrics::record_transition(reservation.status);

        match self
            .retrying("release", || {
                self.ledger.release(reservation.offering_id, &reservation.token)
            })
            .await
        {
            Ok(true) => self.publish_inventory(reservation, InventoryChange::Released(reservation.quantity)),
            Ok(false) => tracing::debug!(
                reservation_id = %reservation.id,
                "Hold already released"
            ),
            Err(e) => {
                tracing::error!(
                    reservation_id = %reservation.id,
                    offering_id = %reservation.offering_id,
                    quantity = reservation.quantity,
                    error = %e,
                    "CRITICAL: failed to release inventory for settled reservation; left for the reconciler"
                );
                ReservationMetrics::record_leak("release");
            }
        }

        let at = reservation.processed_at.unwrap_or_else(|| self.now());
        match self
            .retrying("reverse_usages", || {
                self.store
                    .settle_usages(reservation.id, PromotionUsageStatus::Reversed, at)
            })
            .await
        {
            Ok(0) => {}
            Ok(reversed) => tracing::info!(
                reservation_id = %reservation.id,
                reversed,
                "Promotion usage reversed"
            ),
            Err(e) => tracing::warn!(
                reservation_id = %reservation.id,
                error = %e,
                "Failed to reverse promotion usage"
            ),
        }

        self.publish_status(reservation, Some(ReservationStatus::Pending));
    }
}
