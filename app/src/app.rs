//! `RaffleApp`: one handle over every reservation operation.

use crate::config::Config;
use raffle_core::{
    InventoryLedger, InventorySnapshot, Money, OfferingCatalog, OfferingId, Page,
    PaymentTransactionId, PromotionStore, PromotionUsage, Reservation, ReservationId,
    ReservationQuery, ReservationStore, Result, UserId,
};
use raffle_runtime::{
    ExpiryReaper, InventoryReconciler, PromotionLedger, PurchaseCompletion, PurchaseOutcome,
    ReservationEnvironment, ReservationManager, SettleOutcome,
};

/// Facade over the reservation services, sharing one environment.
///
/// Cheap to clone. Callers that need finer control can reach the services
/// directly through [`Self::reservations`], [`Self::purchases`] and
/// [`Self::promotions`].
pub struct RaffleApp<L, S> {
    env: ReservationEnvironment<L, S>,
    reservations: ReservationManager<L, S>,
    purchases: PurchaseCompletion<L, S>,
    promotions: PromotionLedger<S>,
    reaper: raffle_runtime::ReaperConfig,
    reconciler: raffle_runtime::ReconcilerConfig,
}

impl<L, S> Clone for RaffleApp<L, S> {
    fn clone(&self) -> Self {
        Self {
            env: self.env.clone(),
            reservations: self.reservations.clone(),
            purchases: self.purchases.clone(),
            promotions: self.promotions.clone(),
            reaper: self.reaper,
            reconciler: self.reconciler,
        }
    }
}

impl<L, S> RaffleApp<L, S>
where
    L: InventoryLedger + 'static,
    S: OfferingCatalog + ReservationStore + PromotionStore + 'static,
{
    /// Build the services on `env`, tuned by `config`.
    ///
    /// The environment's retry policy is replaced by the configured one.
    #[must_use]
    pub fn new(env: ReservationEnvironment<L, S>, config: &Config) -> Self {
        let env = env.with_retry(config.reservations.retry_policy());
        Self {
            reservations: ReservationManager::new(env.clone(), config.reservations.settings()),
            purchases: PurchaseCompletion::new(env.clone()),
            promotions: PromotionLedger::new(env.store.clone(), env.clock.clone()),
            reaper: config.reaper.schedule(),
            reconciler: config.reconciler.schedule(),
            env,
        }
    }

    /// Shared environment.
    #[must_use]
    pub const fn env(&self) -> &ReservationEnvironment<L, S> {
        &self.env
    }

    /// Reservation service.
    #[must_use]
    pub const fn reservations(&self) -> &ReservationManager<L, S> {
        &self.reservations
    }

    /// Payment completion service.
    #[must_use]
    pub const fn purchases(&self) -> &PurchaseCompletion<L, S> {
        &self.purchases
    }

    /// Promotion usage service.
    #[must_use]
    pub const fn promotions(&self) -> &PromotionLedger<S> {
        &self.promotions
    }

    /// An expiry reaper on this app's environment and schedule.
    #[must_use]
    pub fn reaper(&self) -> ExpiryReaper<L, S> {
        ExpiryReaper::new(self.env.clone(), self.reaper)
    }

    /// A reconciler on this app's environment and schedule.
    #[must_use]
    pub fn reconciler(&self) -> InventoryReconciler<L, S> {
        InventoryReconciler::new(self.env.clone(), self.reconciler)
    }

    /// Hold `quantity` tickets of `offering_id` for `user_id`.
    ///
    /// # Errors
    ///
    /// See [`ReservationManager::create`].
    pub async fn create_reservation(
        &self,
        offering_id: OfferingId,
        user_id: UserId,
        quantity: u32,
    ) -> Result<Reservation> {
        self.reservations.create(offering_id, user_id, quantity).await
    }

    /// The user's reservation.
    ///
    /// # Errors
    ///
    /// `ReservationNotFound` if missing or owned by someone else.
    pub async fn get_reservation(
        &self,
        reservation_id: ReservationId,
        user_id: UserId,
    ) -> Result<Reservation> {
        self.reservations.get(reservation_id, user_id).await
    }

    /// Cancel the user's pending reservation.
    ///
    /// # Errors
    ///
    /// See [`ReservationManager::cancel`].
    pub async fn cancel_reservation(
        &self,
        reservation_id: ReservationId,
        user_id: UserId,
    ) -> Result<bool> {
        self.reservations.cancel(reservation_id, user_id).await
    }

    /// Whether the reservation can still be paid for.
    ///
    /// # Errors
    ///
    /// `Store` if the lookup fails.
    pub async fn validate_reservation(&self, reservation_id: ReservationId) -> Result<bool> {
        self.reservations.validate(reservation_id).await
    }

    /// The user's reservations, newest first.
    ///
    /// # Errors
    ///
    /// `Store` if the query fails.
    pub async fn list_user_reservations(
        &self,
        user_id: UserId,
        query: &ReservationQuery,
    ) -> Result<Page<Reservation>> {
        self.reservations.list(user_id, query).await
    }

    /// Payment captured for `reservation_id`.
    ///
    /// # Errors
    ///
    /// See [`PurchaseCompletion::on_payment_succeeded`].
    pub async fn on_payment_succeeded(
        &self,
        reservation_id: ReservationId,
        payment_transaction_id: PaymentTransactionId,
    ) -> Result<PurchaseOutcome> {
        self.purchases
            .on_payment_succeeded(reservation_id, payment_transaction_id)
            .await
    }

    /// Payment declined for `reservation_id`.
    ///
    /// # Errors
    ///
    /// See [`PurchaseCompletion::on_payment_failed`].
    pub async fn on_payment_failed(
        &self,
        reservation_id: ReservationId,
        reason: &str,
    ) -> Result<SettleOutcome> {
        self.purchases.on_payment_failed(reservation_id, reason).await
    }

    /// Payment never completed for `reservation_id`.
    ///
    /// # Errors
    ///
    /// See [`PurchaseCompletion::on_payment_timeout`].
    pub async fn on_payment_timeout(&self, reservation_id: ReservationId) -> Result<SettleOutcome> {
        self.purchases.on_payment_timeout(reservation_id).await
    }

    /// Apply a promotion code to the user's pending reservation.
    ///
    /// # Errors
    ///
    /// See [`PromotionLedger::apply`].
    pub async fn apply_promotion(
        &self,
        code: &str,
        user_id: UserId,
        reservation_id: ReservationId,
        discount: Money,
    ) -> Result<PromotionUsage> {
        self.promotions
            .apply(code, user_id, reservation_id, discount)
            .await
    }

    /// Current ledger counters for an offering.
    ///
    /// # Errors
    ///
    /// See [`ReservationManager::inventory_status`].
    pub async fn inventory_status(&self, offering_id: OfferingId) -> Result<InventorySnapshot> {
        self.reservations.inventory_status(offering_id).await
    }
}
