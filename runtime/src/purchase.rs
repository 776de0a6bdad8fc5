//! Payment completion: turning a paid reservation into tickets, or releasing
//! an unpaid one.
//!
//! Payment signals are delivered at least once and may race the reaper and the
//! user. Every path goes through a guarded claim, so each reservation is
//! settled exactly once no matter how many signals arrive.

use crate::environment::ReservationEnvironment;
use crate::metrics::ReservationMetrics;
use raffle_core::{
    Claim, ClaimOutcome, ConfirmOutcome, InventoryChange, InventoryLedger, PaymentTransactionId,
    PromotionStore, Reservation, ReservationError, ReservationId, ReservationStatus,
    ReservationStore, Result, Ticket,
};
use std::time::Instant;

/// Message recorded when a payment lands after the hold ran out.
pub const LATE_PAYMENT_MESSAGE: &str = "payment received after reservation expired";

/// Message recorded when the payment provider gives up.
pub const PAYMENT_TIMEOUT_MESSAGE: &str = "payment timed out";

/// Result of a payment success signal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PurchaseOutcome {
    /// This signal confirmed the reservation and issued the tickets.
    Confirmed {
        /// The confirmed reservation
        reservation: Reservation,
        /// Issued tickets, ordered by number
        tickets: Vec<Ticket>,
    },
    /// A previous signal already confirmed it; same tickets returned.
    AlreadyConfirmed {
        /// The confirmed reservation
        reservation: Reservation,
        /// Issued tickets, ordered by number
        tickets: Vec<Ticket>,
    },
    /// The reservation could not be confirmed (expired, cancelled or failed).
    /// The payment needs refunding by the caller.
    Declined(Reservation),
}

impl PurchaseOutcome {
    /// The reservation in its current state.
    #[must_use]
    pub const fn reservation(&self) -> &Reservation {
        match self {
            Self::Confirmed { reservation, .. } | Self::AlreadyConfirmed { reservation, .. } => {
                reservation
            }
            Self::Declined(reservation) => reservation,
        }
    }

    /// Tickets the buyer owns for this reservation.
    #[must_use]
    pub fn tickets(&self) -> &[Ticket] {
        match self {
            Self::Confirmed { tickets, .. } | Self::AlreadyConfirmed { tickets, .. } => tickets,
            Self::Declined(_) => &[],
        }
    }
}

/// Result of a payment failure or timeout signal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SettleOutcome {
    /// This signal failed the reservation and released its hold.
    Settled(Reservation),
    /// The reservation had already reached a terminal state.
    AlreadyTerminal(Reservation),
}

impl SettleOutcome {
    /// The reservation in its current state.
    #[must_use]
    pub const fn reservation(&self) -> &Reservation {
        match self {
            Self::Settled(reservation) | Self::AlreadyTerminal(reservation) => reservation,
        }
    }
}

/// Applies payment signals to reservations.
pub struct PurchaseCompletion<L, S> {
    env: ReservationEnvironment<L, S>,
}

impl<L, S> Clone for PurchaseCompletion<L, S> {
    fn clone(&self) -> Self {
        Self {
            env: self.env.clone(),
        }
    }
}

impl<L, S> PurchaseCompletion<L, S>
where
    L: InventoryLedger,
    S: ReservationStore + PromotionStore,
{
    /// Create the service.
    #[must_use]
    pub const fn new(env: ReservationEnvironment<L, S>) -> Self {
        Self { env }
    }

    /// Confirm a paid reservation and issue its tickets.
    ///
    /// # Errors
    ///
    /// - `ReservationNotFound` if the reservation does not exist
    /// - `Store` if the confirmation transaction fails; nothing was applied
    ///   and the signal can be redelivered
    #[tracing::instrument(skip(self), fields(reservation_id = %reservation_id))]
    pub async fn on_payment_succeeded(
        &self,
        reservation_id: ReservationId,
        payment_transaction_id: PaymentTransactionId,
    ) -> Result<PurchaseOutcome> {
        let started = Instant::now();
        let now = self.env.now();

        match self
            .env
            .store
            .confirm(reservation_id, payment_transaction_id, now)
            .await?
        {
            ConfirmOutcome::Confirmed {
                reservation,
                tickets,
            } => {
                self.commit_hold(&reservation).await;
                ReservationMetrics::record_confirmed(tickets.len(), started.elapsed());
                tracing::info!(
                    offering_id = %reservation.offering_id,
                    tickets = tickets.len(),
                    "Reservation confirmed"
                );
                self.env
                    .publish_status(&reservation, Some(ReservationStatus::Pending));
                Ok(PurchaseOutcome::Confirmed {
                    reservation,
                    tickets,
                })
            }
            ConfirmOutcome::Lost(current) => self.resolve_lost_confirmation(current).await,
            ConfirmOutcome::NotFound => Err(ReservationError::ReservationNotFound(reservation_id)),
        }
    }

    async fn commit_hold(&self, reservation: &Reservation) {
        match self
            .env
            .retrying("commit", || {
                self.env
                    .ledger
                    .commit(reservation.offering_id, &reservation.token)
            })
            .await
        {
            Ok(true) => self
                .env
                .publish_inventory(reservation, InventoryChange::Sold(reservation.quantity)),
            Ok(false) => tracing::warn!(
                reservation_id = %reservation.id,
                "No ledger hold to commit for confirmed reservation"
            ),
            Err(e) => {
                tracing::error!(
                    reservation_id = %reservation.id,
                    offering_id = %reservation.offering_id,
                    quantity = reservation.quantity,
                    error = %e,
                    "CRITICAL: failed to commit ledger hold for confirmed reservation; left for the reconciler"
                );
                ReservationMetrics::record_leak("commit");
            }
        }
    }

    async fn resolve_lost_confirmation(&self, current: Reservation) -> Result<PurchaseOutcome> {
        match current.status {
            ReservationStatus::Confirmed => {
                ReservationMetrics::record_duplicate_signal();
                tracing::info!("Duplicate payment success signal; returning existing confirmation");
                let tickets = self.env.store.tickets_for_reservation(current.id).await?;
                Ok(PurchaseOutcome::AlreadyConfirmed {
                    reservation: current,
                    tickets,
                })
            }
            ReservationStatus::Pending => {
                // Still pending but past expiry: expire it here rather than
                // waiting for the reaper.
                let claim = Claim::expire(self.env.now(), Some(LATE_PAYMENT_MESSAGE.to_string()));
                match self.env.store.claim(current.id, &claim).await? {
                    ClaimOutcome::Claimed(expired) => {
                        tracing::warn!(
                            expires_at = %expired.expires_at,
                            "Payment arrived after reservation expired; declined"
                        );
                        self.env.settle_claimed(&expired).await;
                        Ok(PurchaseOutcome::Declined(expired))
                    }
                    ClaimOutcome::Lost(other) => Ok(PurchaseOutcome::Declined(other)),
                    ClaimOutcome::NotFound => Err(ReservationError::ReservationNotFound(current.id)),
                }
            }
            status => {
                ReservationMetrics::record_duplicate_signal();
                tracing::info!(status = %status, "Payment success for settled reservation; declined");
                Ok(PurchaseOutcome::Declined(current))
            }
        }
    }

    /// Fail a reservation whose payment failed and release its tickets.
    ///
    /// # Errors
    ///
    /// - `ReservationNotFound` if the reservation does not exist
    /// - `Store` if the claim fails
    #[tracing::instrument(skip(self), fields(reservation_id = %reservation_id))]
    pub async fn on_payment_failed(
        &self,
        reservation_id: ReservationId,
        reason: &str,
    ) -> Result<SettleOutcome> {
        let claim = Claim::fail(self.env.now(), reason);
        match self.env.store.claim(reservation_id, &claim).await? {
            ClaimOutcome::Claimed(failed) => {
                tracing::info!(reason, quantity = failed.quantity, "Reservation failed");
                self.env.settle_claimed(&failed).await;
                Ok(SettleOutcome::Settled(failed))
            }
            ClaimOutcome::Lost(current) => {
                ReservationMetrics::record_duplicate_signal();
                tracing::info!(status = %current.status, "Payment failure for settled reservation");
                Ok(SettleOutcome::AlreadyTerminal(current))
            }
            ClaimOutcome::NotFound => Err(ReservationError::ReservationNotFound(reservation_id)),
        }
    }

    /// Fail a reservation whose payment never completed.
    ///
    /// # Errors
    ///
    /// Same as [`Self::on_payment_failed`].
    pub async fn on_payment_timeout(&self, reservation_id: ReservationId) -> Result<SettleOutcome> {
        self.on_payment_failed(reservation_id, PAYMENT_TIMEOUT_MESSAGE)
            .await
    }
}
