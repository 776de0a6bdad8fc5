//! Durable store traits.
//!
//! The durable store is the single source of truth for "which reservation
//! exists and in what state". All reservation transitions go through a guarded
//! [`Claim`]: a conditional update from `pending` to the target that succeeds
//! for at most one concurrent caller.

use crate::error::Result;
use crate::types::{
    InventorySeed, Offering, OfferingId, Page, PaymentTransactionId, Promotion, PromotionUsage,
    PromotionUsageStatus, Reservation, ReservationId, ReservationQuery, ReservationStatus,
    ReservationToken, Ticket, UserId,
};
use chrono::{DateTime, Utc};
use std::future::Future;

/// Extra condition a claim must satisfy besides `status = pending`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClaimGuard {
    /// No extra condition.
    Any,
    /// Only the owner may claim; other users see `NotFound`.
    Owner(UserId),
    /// Only if `expires_at <= at`.
    ExpiredBy(DateTime<Utc>),
}

/// A guarded pending → terminal transition (other than confirmation).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Claim {
    /// Terminal status to move to
    pub target: ReservationStatus,
    /// Transition time
    pub at: DateTime<Utc>,
    /// Extra condition
    pub guard: ClaimGuard,
    /// Message recorded on the reservation
    pub error_message: Option<String>,
}

impl Claim {
    /// User-driven cancellation.
    #[must_use]
    pub const fn cancel(user_id: UserId, at: DateTime<Utc>) -> Self {
        Self {
            target: ReservationStatus::Cancelled,
            at,
            guard: ClaimGuard::Owner(user_id),
            error_message: None,
        }
    }

    /// Expiry; only succeeds once `expires_at` has passed.
    #[must_use]
    pub const fn expire(at: DateTime<Utc>, error_message: Option<String>) -> Self {
        Self {
            target: ReservationStatus::Expired,
            at,
            guard: ClaimGuard::ExpiredBy(at),
            error_message,
        }
    }

    /// Payment-driven failure.
    #[must_use]
    pub fn fail(at: DateTime<Utc>, error_message: impl Into<String>) -> Self {
        Self {
            target: ReservationStatus::Failed,
            at,
            guard: ClaimGuard::Any,
            error_message: Some(error_message.into()),
        }
    }
}

/// Result of [`ReservationStore::claim`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// This caller won; the reservation is in the target state.
    Claimed(Reservation),
    /// Someone else won, or the guard did not hold. Carries the current row.
    Lost(Reservation),
    /// No such reservation (or not visible to the claimer).
    NotFound,
}

/// Result of [`ReservationStore::confirm`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfirmOutcome {
    /// Claimed and tickets issued in one transaction.
    Confirmed {
        /// The confirmed reservation
        reservation: Reservation,
        /// Newly issued tickets
        tickets: Vec<Ticket>,
    },
    /// Not pending, or past `expires_at`. Carries the current row.
    Lost(Reservation),
    /// No such reservation.
    NotFound,
}

/// Result of [`PromotionStore::record_usage`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UsageOutcome {
    /// Pending usage written.
    Recorded(PromotionUsage),
    /// The code was already applied to this transaction; existing row returned.
    Existing(PromotionUsage),
    /// The user has used up their allowance (pending + resolved).
    UserLimitReached,
    /// The code has used up its global allowance (pending + resolved).
    UsageLimitReached,
    /// The checkout is no longer the user's pending, unexpired reservation.
    /// Carries the current row, `None` if missing or owned by someone else.
    CheckoutClosed(Option<Reservation>),
}

/// Read access to offerings, which are owned by the catalog service.
pub trait OfferingCatalog: Send + Sync {
    /// Look up an offering.
    ///
    /// # Errors
    ///
    /// Returns `Store` if the query fails.
    fn get_offering(
        &self,
        offering_id: OfferingId,
    ) -> impl Future<Output = Result<Option<Offering>>> + Send;

    /// Offerings that are active with an open window at `now`.
    ///
    /// # Errors
    ///
    /// Returns `Store` if the query fails.
    fn open_offerings(
        &self,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<Offering>>> + Send;
}

/// Durable reservation and ticket storage.
pub trait ReservationStore: Send + Sync {
    /// Insert a new pending reservation.
    ///
    /// # Errors
    ///
    /// Returns `Store` if the insert fails (including token collisions).
    fn insert_reservation(
        &self,
        reservation: &Reservation,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Load a reservation by id, regardless of owner.
    ///
    /// # Errors
    ///
    /// Returns `Store` if the query fails.
    fn get_reservation(
        &self,
        reservation_id: ReservationId,
    ) -> impl Future<Output = Result<Option<Reservation>>> + Send;

    /// Load a reservation by its ledger token.
    ///
    /// # Errors
    ///
    /// Returns `Store` if the query fails.
    fn reservation_by_token(
        &self,
        token: &ReservationToken,
    ) -> impl Future<Output = Result<Option<Reservation>>> + Send;

    /// A user's reservations, newest first.
    ///
    /// # Errors
    ///
    /// Returns `Store` if the query fails.
    fn list_user_reservations(
        &self,
        user_id: UserId,
        query: &ReservationQuery,
    ) -> impl Future<Output = Result<Page<Reservation>>> + Send;

    /// Conditionally move a pending reservation to `claim.target`.
    ///
    /// # Errors
    ///
    /// Returns `Store` if the update fails.
    fn claim(
        &self,
        reservation_id: ReservationId,
        claim: &Claim,
    ) -> impl Future<Output = Result<ClaimOutcome>> + Send;

    /// In one transaction: claim pending → confirmed (only while `at <
    /// expires_at`), allocate sequential ticket numbers for the offering,
    /// insert the tickets, record the payment, and resolve the transaction's
    /// pending promotion usages.
    ///
    /// # Errors
    ///
    /// Returns `Store` if the transaction fails; nothing is applied then.
    fn confirm(
        &self,
        reservation_id: ReservationId,
        payment_transaction_id: PaymentTransactionId,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<ConfirmOutcome>> + Send;

    /// Tickets issued from a reservation, ordered by number.
    ///
    /// # Errors
    ///
    /// Returns `Store` if the query fails.
    fn tickets_for_reservation(
        &self,
        reservation_id: ReservationId,
    ) -> impl Future<Output = Result<Vec<Ticket>>> + Send;

    /// Pending reservations whose `expires_at <= now`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `Store` if the query fails.
    fn expired_pending(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<Reservation>>> + Send;

    /// Ledger seed for an offering: sold count, pending holds, per-user holdings.
    ///
    /// # Errors
    ///
    /// Returns `Store` if the query fails.
    fn inventory_seed(
        &self,
        offering: &Offering,
    ) -> impl Future<Output = Result<InventorySeed>> + Send;
}

/// Promotion codes and their usage audit.
pub trait PromotionStore: Send + Sync {
    /// Look up a promotion by normalized code.
    ///
    /// # Errors
    ///
    /// Returns `Store` if the query fails.
    fn get_promotion(&self, code: &str)
    -> impl Future<Output = Result<Option<Promotion>>> + Send;

    /// Atomically check that `usage.transaction_id` is still the user's
    /// pending reservation with `expires_at > usage.created_at`, check the
    /// promotion's per-user and global limits against pending + resolved
    /// usages, and insert `usage` as pending.
    ///
    /// The reservation row stays locked until the usage is written, so a
    /// concurrent cancel, expiry or confirmation either sees the usage or
    /// makes this call return `CheckoutClosed`.
    ///
    /// # Errors
    ///
    /// Returns `Store` if the transaction fails.
    fn record_usage(
        &self,
        promotion: &Promotion,
        usage: &PromotionUsage,
    ) -> impl Future<Output = Result<UsageOutcome>> + Send;

    /// Move the transaction's pending usages to `to`. Returns rows changed.
    ///
    /// # Errors
    ///
    /// Returns `Store` if the update fails.
    fn settle_usages(
        &self,
        transaction_id: ReservationId,
        to: PromotionUsageStatus,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<u64>> + Send;

    /// All usages attached to a transaction.
    ///
    /// # Errors
    ///
    /// Returns `Store` if the query fails.
    fn usages_for_transaction(
        &self,
        transaction_id: ReservationId,
    ) -> impl Future<Output = Result<Vec<PromotionUsage>>> + Send;
}
