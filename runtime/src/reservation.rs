//! Reservation lifecycle: create, read, cancel, validate, list.
//!
//! # Create
//!
//! ```text
//! validate ──► rate limit ──► cap check ──► ledger.reserve ──► store.insert ──► pending
//!                                                  │                 │            │
//!                                   (denied: nothing changed)        │            └─► rate limit record
//!                                                                    └─ failure ──► ledger.release
//! ```
//!
//! Inventory is always reserved first and persisted second. A failed insert
//! runs a compensating release; the caller learns whether it succeeded. Only
//! persisted reservations count against the rate limit windows.

use crate::environment::ReservationEnvironment;
use crate::metrics::ReservationMetrics;
use chrono::{DateTime, Duration, Utc};
use raffle_core::{
    CapCheck, Claim, ClaimOutcome, InventoryChange, InventoryLedger, InventorySnapshot,
    OfferingCatalog, OfferingId, Page, PromotionStore, RateLimits, Reservation, ReservationError,
    ReservationId, ReservationQuery, ReservationStatus, ReservationStore, ReservationToken,
    ReserveOutcome, ReserveRequest, Result, UserId,
};
use std::time::Instant;

/// Tunables for new reservations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservationSettings {
    /// How long a pending reservation holds inventory
    pub ttl: Duration,
    /// Largest quantity a single reservation may hold
    pub max_quantity: u32,
    /// Reservation windows per user and per user and offering
    pub rate_limits: RateLimits,
}

impl Default for ReservationSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::minutes(5),
            max_quantity: 100,
            rate_limits: RateLimits::none(),
        }
    }
}

/// Creates, reads, cancels and lists reservations.
pub struct ReservationManager<L, S> {
    env: ReservationEnvironment<L, S>,
    settings: ReservationSettings,
}

impl<L, S> Clone for ReservationManager<L, S> {
    fn clone(&self) -> Self {
        Self {
            env: self.env.clone(),
            settings: self.settings,
        }
    }
}

impl<L, S> ReservationManager<L, S>
where
    L: InventoryLedger,
    S: OfferingCatalog + ReservationStore + PromotionStore,
{
    /// Create a manager.
    #[must_use]
    pub const fn new(env: ReservationEnvironment<L, S>, settings: ReservationSettings) -> Self {
        Self { env, settings }
    }

    /// Settings in effect.
    #[must_use]
    pub const fn settings(&self) -> &ReservationSettings {
        &self.settings
    }

    /// Hold `quantity` tickets of an offering for `user_id` until the TTL runs out.
    ///
    /// # Errors
    ///
    /// - `InvalidQuantity`, `OfferingNotFound`, `OfferingClosed`: request rejected up front
    /// - `RateLimitExceeded`: the user reserved too often within a window
    /// - `ParticipantCapExceeded`, `InsufficientInventory`: ledger denied; nothing changed
    /// - `LedgerUnavailable`: ledger unreachable after retries; nothing reserved
    /// - `PersistenceFailureAfterReserve`: the row could not be written after
    ///   the hold was taken; the hold was released unless `compensated` is false
    #[tracing::instrument(skip(self), fields(offering_id = %offering_id, user_id = %user_id))]
    pub async fn create(
        &self,
        offering_id: OfferingId,
        user_id: UserId,
        quantity: u32,
    ) -> Result<Reservation> {
        let started = Instant::now();
        match self.create_inner(offering_id, user_id, quantity).await {
            Ok(reservation) => {
                ReservationMetrics::record_created(started.elapsed());
                Ok(reservation)
            }
            Err(e) => {
                ReservationMetrics::record_rejected(e.code());
                if e.is_business_rule() {
                    tracing::info!(error = %e, "Reservation denied");
                } else {
                    tracing::warn!(error = %e, "Reservation failed");
                }
                Err(e)
            }
        }
    }

    async fn create_inner(
        &self,
        offering_id: OfferingId,
        user_id: UserId,
        quantity: u32,
    ) -> Result<Reservation> {
        let invalid_quantity = ReservationError::InvalidQuantity {
            requested: quantity,
            max: self.settings.max_quantity,
        };
        if quantity == 0 || quantity > self.settings.max_quantity {
            return Err(invalid_quantity);
        }

        let offering = self
            .env
            .retrying("get_offering", || self.env.store.get_offering(offering_id))
            .await?
            .ok_or(ReservationError::OfferingNotFound(offering_id))?;
        let now = self.env.now();
        if !offering.accepts_entries(now) {
            return Err(ReservationError::OfferingClosed(offering_id));
        }
        let unit_price = offering.ticket_price;
        let total_price = unit_price
            .checked_multiply(quantity)
            .ok_or(invalid_quantity)?;
        let expires_at = now
            .checked_add_signed(self.settings.ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.check_rate_limits(offering_id, user_id, now).await?;

        let limits = offering.limits();
        let cap = self
            .env
            .retrying("check_participant_cap", || {
                self.env
                    .ledger
                    .check_participant_cap(offering_id, user_id, quantity, &limits)
            })
            .await?;
        if let CapCheck::Exceeded(kind) = cap {
            return Err(ReservationError::ParticipantCapExceeded(kind));
        }

        let request = ReserveRequest {
            offering_id,
            user_id,
            quantity,
            token: ReservationToken::generate(),
            limits,
        };
        let mut outcome = self.reserve(&request).await?;
        if outcome == ReserveOutcome::NotInitialized {
            self.env.bootstrap(&offering).await?;
            outcome = self.reserve(&request).await?;
        }
        match outcome {
            ReserveOutcome::Reserved | ReserveOutcome::AlreadyHeld => {}
            ReserveOutcome::InsufficientInventory { available } => {
                return Err(ReservationError::InsufficientInventory {
                    requested: quantity,
                    available,
                });
            }
            ReserveOutcome::CapExceeded(kind) => {
                return Err(ReservationError::ParticipantCapExceeded(kind));
            }
            ReserveOutcome::NotInitialized => {
                return Err(ReservationError::LedgerNotInitialized(offering_id));
            }
        }

        let reservation = Reservation {
            id: ReservationId::new(),
            offering_id,
            user_id,
            quantity,
            unit_price,
            total_price,
            token: request.token,
            status: ReservationStatus::Pending,
            expires_at,
            created_at: now,
            updated_at: now,
            processed_at: None,
            payment_transaction_id: None,
            error_message: None,
        };

        if let Err(e) = self.env.store.insert_reservation(&reservation).await {
            return Err(self.compensate(&reservation, e).await);
        }
        self.record_rate_limits(&reservation).await;

        tracing::info!(
            reservation_id = %reservation.id,
            quantity,
            expires_at = %reservation.expires_at,
            "Reservation created"
        );
        self.env.publish_status(&reservation, None);
        self.env
            .publish_inventory(&reservation, InventoryChange::Reserved(quantity));
        Ok(reservation)
    }

    async fn check_rate_limits(
        &self,
        offering_id: OfferingId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<()> {
        for (scope, rule) in self.settings.rate_limits.rules() {
            let key = scope.key(user_id, offering_id);
            let recent = self
                .env
                .retrying("rate_limit", || {
                    self.env.rate_limiter.recent(&key, rule.window, now)
                })
                .await?;
            if recent >= rule.max_reservations {
                return Err(ReservationError::RateLimitExceeded(scope));
            }
        }
        Ok(())
    }

    async fn record_rate_limits(&self, reservation: &Reservation) {
        let member = reservation.id.to_string();
        for (scope, rule) in self.settings.rate_limits.rules() {
            let key = scope.key(reservation.user_id, reservation.offering_id);
            if let Err(e) = self
                .env
                .rate_limiter
                .record(&key, &member, rule.window, reservation.created_at)
                .await
            {
                tracing::warn!(
                    reservation_id = %reservation.id,
                    error = %e,
                    "Failed to record reservation in rate limit window"
                );
            }
        }
    }

    async fn reserve(&self, request: &ReserveRequest) -> Result<ReserveOutcome> {
        self.env
            .retrying("reserve", || self.env.ledger.reserve(request))
            .await
    }

    async fn compensate(&self, reservation: &Reservation, cause: ReservationError) -> ReservationError {
        let released = self
            .env
            .retrying("release", || {
                self.env
                    .ledger
                    .release(reservation.offering_id, &reservation.token)
            })
            .await;

        let compensated = released.is_ok();
        if let Err(e) = released {
            tracing::error!(
                offering_id = %reservation.offering_id,
                token = %reservation.token,
                quantity = reservation.quantity,
                persist_error = %cause,
                release_error = %e,
                "CRITICAL: compensating release failed after persistence failure; left for the reconciler"
            );
            ReservationMetrics::record_leak("compensate");
        } else {
            tracing::warn!(
                offering_id = %reservation.offering_id,
                error = %cause,
                "Reservation row not persisted; inventory released"
            );
        }

        ReservationError::PersistenceFailureAfterReserve {
            reason: cause.to_string(),
            compensated,
        }
    }

    /// Load a reservation owned by `user_id`.
    ///
    /// # Errors
    ///
    /// `ReservationNotFound` if it does not exist or belongs to someone else.
    pub async fn get(&self, reservation_id: ReservationId, user_id: UserId) -> Result<Reservation> {
        self.env
            .store
            .get_reservation(reservation_id)
            .await?
            .filter(|r| r.user_id == user_id)
            .ok_or(ReservationError::ReservationNotFound(reservation_id))
    }

    /// Cancel a pending reservation and give its tickets back.
    ///
    /// Returns `true` if this call cancelled it and `false` if it was already
    /// cancelled.
    ///
    /// # Errors
    ///
    /// - `ReservationNotFound` if it does not exist or belongs to someone else
    /// - `ReservationNotPending` if it was confirmed, expired or failed
    #[tracing::instrument(skip(self), fields(reservation_id = %reservation_id))]
    pub async fn cancel(&self, reservation_id: ReservationId, user_id: UserId) -> Result<bool> {
        let claim = Claim::cancel(user_id, self.env.now());
        match self.env.store.claim(reservation_id, &claim).await? {
            ClaimOutcome::Claimed(reservation) => {
                tracing::info!(quantity = reservation.quantity, "Reservation cancelled");
                self.env.settle_claimed(&reservation).await;
                Ok(true)
            }
            ClaimOutcome::Lost(current) if current.status == ReservationStatus::Cancelled => Ok(false),
            ClaimOutcome::Lost(current) => Err(ReservationError::ReservationNotPending {
                id: reservation_id,
                status: current.status,
            }),
            ClaimOutcome::NotFound => Err(ReservationError::ReservationNotFound(reservation_id)),
        }
    }

    /// Whether the reservation can still be paid for: pending and not past
    /// its expiry. Unknown reservations are not valid.
    ///
    /// # Errors
    ///
    /// Returns `Store` if the lookup fails.
    pub async fn validate(&self, reservation_id: ReservationId) -> Result<bool> {
        let now = self.env.now();
        Ok(self
            .env
            .store
            .get_reservation(reservation_id)
            .await?
            .is_some_and(|r| r.is_live(now)))
    }

    /// A user's reservations, newest first.
    ///
    /// # Errors
    ///
    /// Returns `Store` if the query fails.
    pub async fn list(&self, user_id: UserId, query: &ReservationQuery) -> Result<Page<Reservation>> {
        self.env.store.list_user_reservations(user_id, query).await
    }

    /// Ledger counters for an offering, seeding the ledger on first use.
    ///
    /// # Errors
    ///
    /// - `OfferingNotFound` for unknown offerings
    /// - `LedgerUnavailable` / `Store` on infrastructure failure
    pub async fn inventory_status(&self, offering_id: OfferingId) -> Result<InventorySnapshot> {
        if let Some(snapshot) = self.env.ledger.status(offering_id).await? {
            return Ok(snapshot);
        }
        let offering = self
            .env
            .store
            .get_offering(offering_id)
            .await?
            .ok_or(ReservationError::OfferingNotFound(offering_id))?;
        self.env.bootstrap(&offering).await?;
        self.env
            .ledger
            .status(offering_id)
            .await?
            .ok_or(ReservationError::LedgerNotInitialized(offering_id))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use raffle_core::{RateLimitRule, RateLimitScope};
    use raffle_testing::{
        InMemoryLedger, InMemoryRateLimiter, InMemoryStore, OfferingBuilder, manual_clock,
        test_time,
    };
    use std::sync::Arc;

    fn manager() -> (ReservationManager<InMemoryLedger, InMemoryStore>, InMemoryStore) {
        let store = InMemoryStore::new();
        let env = ReservationEnvironment::new(Arc::new(InMemoryLedger::new()), Arc::new(store.clone()))
            .with_clock(Arc::new(manual_clock()));
        (ReservationManager::new(env, ReservationSettings::default()), store)
    }

    #[tokio::test]
    async fn test_quantity_bounds() {
        let (manager, store) = manager();
        let offering = OfferingBuilder::new(test_time()).build();
        store.put_offering(offering.clone());

        for quantity in [0, 101] {
            let err = manager.create(offering.id, UserId::new(), quantity).await.unwrap_err();
            assert!(matches!(err, ReservationError::InvalidQuantity { .. }));
        }
    }

    #[tokio::test]
    async fn test_unknown_and_closed_offerings() {
        let (manager, store) = manager();
        let missing = OfferingId::new();
        assert_eq!(
            manager.create(missing, UserId::new(), 1).await.unwrap_err(),
            ReservationError::OfferingNotFound(missing)
        );

        let closed = OfferingBuilder::new(test_time())
            .window(None, test_time())
            .build();
        store.put_offering(closed.clone());
        assert_eq!(
            manager.create(closed.id, UserId::new(), 1).await.unwrap_err(),
            ReservationError::OfferingClosed(closed.id)
        );
    }

    #[tokio::test]
    async fn test_create_snapshots_price_and_ttl() {
        let (manager, store) = manager();
        let offering = OfferingBuilder::new(test_time()).price_cents(250).build();
        store.put_offering(offering.clone());

        let r = manager.create(offering.id, UserId::new(), 4).await.unwrap();
        assert_eq!(r.status, ReservationStatus::Pending);
        assert_eq!(r.total_price.cents(), 1_000);
        assert_eq!(r.expires_at, test_time() + Duration::minutes(5));
        assert!(manager.validate(r.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_get_is_owner_scoped() {
        let (manager, store) = manager();
        let offering = OfferingBuilder::new(test_time()).build();
        store.put_offering(offering.clone());
        let owner = UserId::new();
        let r = manager.create(offering.id, owner, 1).await.unwrap();

        assert_eq!(manager.get(r.id, owner).await.unwrap().id, r.id);
        assert_eq!(
            manager.get(r.id, UserId::new()).await.unwrap_err(),
            ReservationError::ReservationNotFound(r.id)
        );
    }

    #[tokio::test]
    async fn test_validate_unknown_reservation_is_false() {
        let (manager, _) = manager();
        assert!(!manager.validate(ReservationId::new()).await.unwrap());
    }

    fn limited_manager(
        rate_limits: RateLimits,
    ) -> (
        ReservationManager<InMemoryLedger, InMemoryStore>,
        InMemoryStore,
        Arc<raffle_testing::ManualClock>,
    ) {
        let store = InMemoryStore::new();
        let clock = Arc::new(manual_clock());
        let env = ReservationEnvironment::new(Arc::new(InMemoryLedger::new()), Arc::new(store.clone()))
            .with_clock(clock.clone())
            .with_rate_limiter(Arc::new(InMemoryRateLimiter::new()));
        let settings = ReservationSettings {
            rate_limits,
            ..ReservationSettings::default()
        };
        (ReservationManager::new(env, settings), store, clock)
    }

    #[tokio::test]
    async fn test_rate_limit_per_user_and_per_offering() {
        let (manager, store, clock) = limited_manager(RateLimits {
            per_user: Some(RateLimitRule::per_hour(3)),
            per_user_offering: Some(RateLimitRule::per_hour(2)),
        });
        let first = OfferingBuilder::new(test_time()).build();
        let second = OfferingBuilder::new(test_time()).build();
        store.put_offering(first.clone());
        store.put_offering(second.clone());
        let user = UserId::new();

        manager.create(first.id, user, 1).await.unwrap();
        manager.create(first.id, user, 1).await.unwrap();
        assert_eq!(
            manager.create(first.id, user, 1).await.unwrap_err(),
            ReservationError::RateLimitExceeded(RateLimitScope::UserOffering)
        );

        manager.create(second.id, user, 1).await.unwrap();
        assert_eq!(
            manager.create(second.id, user, 1).await.unwrap_err(),
            ReservationError::RateLimitExceeded(RateLimitScope::User)
        );
        // Other users are unaffected.
        manager.create(first.id, UserId::new(), 1).await.unwrap();

        clock.advance(Duration::hours(1));
        manager.create(first.id, user, 1).await.unwrap();
    }

    #[tokio::test]
    async fn test_denied_and_unpersisted_requests_do_not_count() {
        let (manager, store, _) = limited_manager(RateLimits {
            per_user: Some(RateLimitRule::per_hour(1)),
            per_user_offering: None,
        });
        let offering = OfferingBuilder::new(test_time()).total_tickets(2).build();
        store.put_offering(offering.clone());
        let user = UserId::new();

        assert!(matches!(
            manager.create(offering.id, user, 3).await.unwrap_err(),
            ReservationError::InsufficientInventory { .. }
        ));
        store.fail_inserts(true);
        assert!(matches!(
            manager.create(offering.id, user, 1).await.unwrap_err(),
            ReservationError::PersistenceFailureAfterReserve { .. }
        ));
        store.fail_inserts(false);

        manager.create(offering.id, user, 1).await.unwrap();
        assert_eq!(
            manager.create(offering.id, user, 1).await.unwrap_err(),
            ReservationError::RateLimitExceeded(RateLimitScope::User)
        );
    }

    #[tokio::test]
    async fn test_long_ttl_does_not_overflow_expiry() {
        let store = InMemoryStore::new();
        let env = ReservationEnvironment::new(Arc::new(InMemoryLedger::new()), Arc::new(store.clone()))
            .with_clock(Arc::new(manual_clock()));
        let settings = ReservationSettings {
            ttl: Duration::MAX,
            ..ReservationSettings::default()
        };
        let manager = ReservationManager::new(env, settings);
        let offering = OfferingBuilder::new(test_time()).build();
        store.put_offering(offering.clone());

        let r = manager.create(offering.id, UserId::new(), 1).await.unwrap();
        assert_eq!(r.expires_at, DateTime::<Utc>::MAX_UTC);
    }
}
