//! Inventory ledger trait.
//!
//! The ledger is the single source of truth for "is there room". Per offering
//! it tracks `available` and `reserved` counters, the participant set, each
//! user's held quantity, and the live holds keyed by reservation token.
//!
//! # Atomicity
//!
//! Every mutating operation is ONE atomic primitive on the ledger store (a
//! script in Redis, a single critical section in memory). There is never a
//! read in the application followed by a write: `reserve` checks availability
//! and caps and applies the hold in the same step, or does nothing.
//!
//! # Idempotency
//!
//! Holds are keyed by [`ReservationToken`]. Replaying `reserve` with the same
//! token reports the existing hold, and `release`/`commit` consume the hold,
//! so a retried or duplicated call can never move inventory twice.

use crate::error::Result;
use crate::types::{
    CapKind, HoldSeed, InventorySeed, InventorySnapshot, OfferingId, ParticipantLimits,
    ReservationToken, UserId,
};
use std::future::Future;

/// A request to hold tickets for a reservation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReserveRequest {
    /// Offering
    pub offering_id: OfferingId,
    /// Buyer
    pub user_id: UserId,
    /// Tickets to hold
    pub quantity: u32,
    /// Token identifying the hold
    pub token: ReservationToken,
    /// Caps to enforce
    pub limits: ParticipantLimits,
}

/// Result of [`InventoryLedger::reserve`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReserveOutcome {
    /// Hold applied.
    Reserved,
    /// A hold for this token already exists; nothing changed.
    AlreadyHeld,
    /// Not enough available tickets; nothing changed.
    InsufficientInventory {
        /// Tickets available at the time of the check
        available: u32,
    },
    /// A participation cap denies the entry; nothing changed.
    CapExceeded(CapKind),
    /// The ledger has no entry for the offering; nothing changed.
    NotInitialized,
}

impl ReserveOutcome {
    /// Whether the token now holds inventory.
    #[must_use]
    pub const fn is_reserved(&self) -> bool {
        matches!(self, Self::Reserved | Self::AlreadyHeld)
    }
}

/// Result of a read-only participation cap check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CapCheck {
    /// The user may enter with the requested quantity.
    Allowed,
    /// A cap would be exceeded.
    Exceeded(CapKind),
}

/// Atomic per-offering inventory counters.
///
/// Implementations must fail closed: an unreachable ledger yields
/// `ReservationError::LedgerUnavailable`, never a successful outcome.
pub trait InventoryLedger: Send + Sync {
    /// Seed an offering's counters, holds and holdings if the ledger has no
    /// entry for it.
    ///
    /// Returns `true` if this call created the entry, `false` if it already existed.
    ///
    /// # Errors
    ///
    /// Returns `LedgerUnavailable` if the ledger cannot be reached.
    fn initialize(
        &self,
        offering_id: OfferingId,
        seed: &InventorySeed,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Atomically check availability and caps, then move `quantity` from
    /// available to reserved under the request's token.
    ///
    /// # Errors
    ///
    /// Returns `LedgerUnavailable` if the ledger cannot be reached. Denials are
    /// outcomes, not errors.
    fn reserve(
        &self,
        request: &ReserveRequest,
    ) -> impl Future<Output = Result<ReserveOutcome>> + Send;

    /// Return the token's held quantity to available.
    ///
    /// Returns `false` if the token holds nothing (already released or committed).
    ///
    /// # Errors
    ///
    /// Returns `LedgerUnavailable` if the ledger cannot be reached.
    fn release(
        &self,
        offering_id: OfferingId,
        token: &ReservationToken,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Convert the token's hold into sold inventory (reserved decremented,
    /// available untouched).
    ///
    /// Returns `false` if the token holds nothing.
    ///
    /// # Errors
    ///
    /// Returns `LedgerUnavailable` if the ledger cannot be reached.
    fn commit(
        &self,
        offering_id: OfferingId,
        token: &ReservationToken,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Current available count.
    ///
    /// # Errors
    ///
    /// Returns `LedgerNotInitialized` for unknown offerings, `LedgerUnavailable`
    /// if the ledger cannot be reached.
    fn available_count(&self, offering_id: OfferingId)
    -> impl Future<Output = Result<u32>> + Send;

    /// Snapshot of an offering's counters, `None` if not initialized.
    ///
    /// # Errors
    ///
    /// Returns `LedgerUnavailable` if the ledger cannot be reached.
    fn status(
        &self,
        offering_id: OfferingId,
    ) -> impl Future<Output = Result<Option<InventorySnapshot>>> + Send;

    /// Live holds of an offering, in no particular order. Empty if the
    /// offering is not initialized.
    ///
    /// # Errors
    ///
    /// Returns `LedgerUnavailable` if the ledger cannot be reached.
    fn holds(&self, offering_id: OfferingId)
    -> impl Future<Output = Result<Vec<HoldSeed>>> + Send;

    /// Read-only check whether `user_id` may enter with `quantity` more tickets.
    ///
    /// Advisory only: `reserve` re-checks atomically.
    ///
    /// # Errors
    ///
    /// Returns `LedgerUnavailable` if the ledger cannot be reached.
    fn check_participant_cap(
        &self,
        offering_id: OfferingId,
        user_id: UserId,
        quantity: u32,
        limits: &ParticipantLimits,
    ) -> impl Future<Output = Result<CapCheck>> + Send;

    /// Register `user_id` as a participant. Idempotent.
    ///
    /// Returns `true` if the user is now (or already was) a participant,
    /// `false` if the participant cap is full.
    ///
    /// # Errors
    ///
    /// Returns `LedgerUnavailable` if the ledger cannot be reached.
    fn add_participant(
        &self,
        offering_id: OfferingId,
        user_id: UserId,
        max_participants: Option<u32>,
    ) -> impl Future<Output = Result<bool>> + Send;
}
