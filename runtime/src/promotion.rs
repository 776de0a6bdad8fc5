//! At-most-once promotion code usage tied to a checkout.
//!
//! Usage rows start `pending` when a code is applied to a reservation, become
//! `resolved` when the reservation is paid and `reversed` when it is
//! cancelled, expires or fails. Limits count pending and resolved rows, so a
//! code cannot be spent twice by two checkouts racing each other.

use crate::metrics::ReservationMetrics;
use chrono::{DateTime, Utc};
use raffle_core::{
    Clock, Money, Promotion, PromotionStore, PromotionUsage, PromotionUsageId,
    PromotionUsageStatus, Reservation, ReservationError, ReservationId, ReservationStatus,
    ReservationStore, Result, UsageOutcome, UserId,
};
use std::sync::Arc;

/// Applies, resolves and reverses promotion usages.
pub struct PromotionLedger<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S> Clone for PromotionLedger<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S> PromotionLedger<S>
where
    S: ReservationStore + PromotionStore,
{
    /// Create the ledger.
    #[must_use]
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Apply `code` to the user's pending reservation `transaction_id`.
    ///
    /// Applying the same code to the same reservation again returns the
    /// existing usage. The checkout is re-checked under the store's lock when
    /// the usage is written, so a cancel, expiry or payment racing this call
    /// either settles the usage or makes the call fail.
    ///
    /// # Errors
    ///
    /// - `PromotionNotFound`, `PromotionInactive`, `PromotionNotStarted`,
    ///   `PromotionEnded`: the code cannot be used now
    /// - `ReservationNotFound`, `ReservationNotPending`, `ReservationExpired`:
    ///   the checkout cannot take a discount
    /// - `PromotionNotApplicable`, `PromotionMinimumNotMet`: the code is
    ///   restricted to other offerings or larger checkouts
    /// - `InvalidDiscount`: zero, or more than the reservation total
    /// - `PromotionUsageLimitReached`: per-user or global limit used up
    #[tracing::instrument(skip(self), fields(transaction_id = %transaction_id, user_id = %user_id))]
    pub async fn apply(
        &self,
        code: &str,
        user_id: UserId,
        transaction_id: ReservationId,
        discount: Money,
    ) -> Result<PromotionUsage> {
        let code = Promotion::normalize_code(code);
        let now = self.clock.now();

        let result = self
            .apply_inner(&code, user_id, transaction_id, discount, now)
            .await;
        match &result {
            Ok((_, outcome)) => ReservationMetrics::record_promotion(*outcome),
            Err(e) => {
                ReservationMetrics::record_promotion("rejected");
                tracing::info!(code = %code, error = %e, "Promotion not applied");
            }
        }
        result.map(|(usage, _)| usage)
    }

    async fn apply_inner(
        &self,
        code: &str,
        user_id: UserId,
        transaction_id: ReservationId,
        discount: Money,
        now: DateTime<Utc>,
    ) -> Result<(PromotionUsage, &'static str)> {
        let promotion = self
            .store
            .get_promotion(code)
            .await?
            .ok_or_else(|| ReservationError::PromotionNotFound(code.to_string()))?;
        check_window(&promotion, now)?;

        let current = self
            .store
            .get_reservation(transaction_id)
            .await?
            .filter(|r| r.user_id == user_id);
        let reservation = match current {
            Some(r) if r.is_live(now) => r,
            other => return Err(closed_checkout(transaction_id, other.as_ref())),
        };
        if !promotion.applies_to(reservation.offering_id) {
            return Err(ReservationError::PromotionNotApplicable {
                code: code.to_string(),
                offering_id: reservation.offering_id,
            });
        }
        if !promotion.meets_minimum(reservation.total_price) {
            return Err(ReservationError::PromotionMinimumNotMet {
                code: code.to_string(),
                minimum: promotion.min_purchase.unwrap_or_default(),
            });
        }
        if discount == Money::ZERO || discount > reservation.total_price {
            return Err(ReservationError::InvalidDiscount(code.to_string()));
        }

        let usage = PromotionUsage {
            id: PromotionUsageId::new(),
            transaction_id,
            user_id,
            code: code.to_string(),
            discount,
            status: PromotionUsageStatus::Pending,
            created_at: now,
            settled_at: None,
        };
        match self.store.record_usage(&promotion, &usage).await? {
            UsageOutcome::Recorded(usage) => {
                tracing::info!(code, discount = %usage.discount, "Promotion applied");
                Ok((usage, "applied"))
            }
            UsageOutcome::Existing(usage) => Ok((usage, "existing")),
            UsageOutcome::UserLimitReached | UsageOutcome::UsageLimitReached => {
                Err(ReservationError::PromotionUsageLimitReached {
                    code: code.to_string(),
                })
            }
            UsageOutcome::CheckoutClosed(current) => {
                Err(closed_checkout(transaction_id, current.as_ref()))
            }
        }
    }

    /// Mark the transaction's pending usages as final. Returns rows changed.
    ///
    /// # Errors
    ///
    /// Returns `Store` if the update fails.
    pub async fn resolve(&self, transaction_id: ReservationId) -> Result<u64> {
        self.store
            .settle_usages(transaction_id, PromotionUsageStatus::Resolved, self.clock.now())
            .await
    }

    /// Give the transaction's pending usages back. Returns rows changed.
    ///
    /// # Errors
    ///
    /// Returns `Store` if the update fails.
    pub async fn reverse(&self, transaction_id: ReservationId) -> Result<u64> {
        self.store
            .settle_usages(transaction_id, PromotionUsageStatus::Reversed, self.clock.now())
            .await
    }

    /// Audit rows of a transaction.
    ///
    /// # Errors
    ///
    /// Returns `Store` if the query fails.
    pub async fn usages(&self, transaction_id: ReservationId) -> Result<Vec<PromotionUsage>> {
        self.store.usages_for_transaction(transaction_id).await
    }
}

/// Why `current` cannot take a discount: missing or someone else's, settled,
/// or past its expiry.
fn closed_checkout(id: ReservationId, current: Option<&Reservation>) -> ReservationError {
    match current {
        None => ReservationError::ReservationNotFound(id),
        Some(r) if r.status != ReservationStatus::Pending => {
            ReservationError::ReservationNotPending { id, status: r.status }
        }
        Some(_) => ReservationError::ReservationExpired(id),
    }
}

fn check_window(promotion: &Promotion, now: DateTime<Utc>) -> Result<()> {
    if !promotion.active {
        return Err(ReservationError::PromotionInactive(promotion.code.clone()));
    }
    if promotion.starts_at.is_some_and(|starts_at| now < starts_at) {
        return Err(ReservationError::PromotionNotStarted(promotion.code.clone()));
    }
    if promotion.ends_at.is_some_and(|ends_at| now >= ends_at) {
        return Err(ReservationError::PromotionEnded(promotion.code.clone()));
    }
    Ok(())
}
