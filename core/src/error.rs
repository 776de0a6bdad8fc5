//! Error types for reservation, purchase and promotion operations.

use crate::rate_limit::RateLimitScope;
use crate::types::{CapKind, Money, OfferingId, ReservationId, ReservationStatus};
use thiserror::Error;

/// Result type alias for reservation operations.
pub type Result<T> = std::result::Result<T, ReservationError>;

/// Error taxonomy for the reservation core.
///
/// Business-rule variants are returned before any mutation becomes visible;
/// infrastructure variants (`LedgerUnavailable`, `Store`) are retryable.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReservationError {
    // ═══════════════════════════════════════════════════════════
    // Request Validation
    // ═══════════════════════════════════════════════════════════

    /// Requested quantity is zero or above the per-reservation maximum.
    #[error("Invalid quantity {requested} (allowed 1..={max})")]
    InvalidQuantity {
        /// Quantity requested
        requested: u32,
        /// Largest quantity accepted
        max: u32,
    },

    /// Offering does not exist.
    #[error("Offering {0} not found")]
    OfferingNotFound(OfferingId),

    /// Offering is not selling (status or lottery window).
    #[error("Offering {0} is closed for entries")]
    OfferingClosed(OfferingId),

    // ═══════════════════════════════════════════════════════════
    // Inventory Denials
    // ═══════════════════════════════════════════════════════════

    /// Not enough unheld tickets. No mutation occurred; a smaller quantity may succeed.
    #[error("Insufficient inventory: requested {requested}, available {available}")]
    InsufficientInventory {
        /// Quantity requested
        requested: u32,
        /// Tickets available when the ledger checked
        available: u32,
    },

    /// A participation cap denies the entry.
    #[error("Participant cap exceeded: {0}")]
    ParticipantCapExceeded(CapKind),

    /// The user created too many reservations within the window.
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(RateLimitScope),

    // ═══════════════════════════════════════════════════════════
    // Reservation State
    // ═══════════════════════════════════════════════════════════

    /// Reservation does not exist or belongs to someone else.
    #[error("Reservation {0} not found")]
    ReservationNotFound(ReservationId),

    /// Reservation already left the pending state.
    #[error("Reservation {id} is {status}, not pending")]
    ReservationNotPending {
        /// Reservation
        id: ReservationId,
        /// Its current status
        status: ReservationStatus,
    },

    /// Reservation's hold ran out before it could be used.
    #[error("Reservation {0} has expired")]
    ReservationExpired(ReservationId),

    // ═══════════════════════════════════════════════════════════
    // Promotions
    // ═══════════════════════════════════════════════════════════

    /// Unknown promotion code.
    #[error("Promotion {0} not found")]
    PromotionNotFound(String),

    /// Promotion is disabled.
    #[error("Promotion {0} is not active")]
    PromotionInactive(String),

    /// Promotion validity has not started.
    #[error("Promotion {0} has not started yet")]
    PromotionNotStarted(String),

    /// Promotion validity is over.
    #[error("Promotion {0} has ended")]
    PromotionEnded(String),

    /// Per-user or global usage limit reached (pending usages included).
    #[error("Promotion {code} usage limit reached")]
    PromotionUsageLimitReached {
        /// Promotion code
        code: String,
    },

    /// The checkout total is below the promotion's minimum purchase.
    #[error("Minimum purchase amount of {minimum} for promotion {code} not met")]
    PromotionMinimumNotMet {
        /// Promotion code
        code: String,
        /// Smallest checkout total the code applies to
        minimum: Money,
    },

    /// The promotion is restricted to other offerings.
    #[error("Promotion {code} is not applicable for offering {offering_id}")]
    PromotionNotApplicable {
        /// Promotion code
        code: String,
        /// Offering of the checkout
        offering_id: OfferingId,
    },

    /// Discount is zero or larger than the amount it applies to.
    #[error("Invalid discount for promotion {0}")]
    InvalidDiscount(String),

    // ═══════════════════════════════════════════════════════════
    // Infrastructure
    // ═══════════════════════════════════════════════════════════

    /// Ledger could not be reached. Reservations fail closed.
    #[error("Inventory ledger unavailable: {0}")]
    LedgerUnavailable(String),

    /// Ledger has no entry for the offering yet.
    #[error("Inventory ledger not initialized for offering {0}")]
    LedgerNotInitialized(OfferingId),

    /// The ledger hold succeeded but the durable row could not be written.
    ///
    /// A compensating release has been attempted; `compensated == false` means
    /// inventory leaked until reconciliation.
    #[error("Reservation could not be persisted after reserving inventory: {reason}")]
    PersistenceFailureAfterReserve {
        /// Underlying store error
        reason: String,
        /// Whether the compensating release succeeded
        compensated: bool,
    },

    /// Durable store operation failed.
    #[error("Store error: {0}")]
    Store(String),
}

impl ReservationError {
    /// Returns `true` for transient infrastructure failures worth retrying.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::LedgerUnavailable(_) | Self::Store(_))
    }

    /// Returns `true` if the error is a business-rule denial the caller can act on.
    #[must_use]
    pub const fn is_business_rule(&self) -> bool {
        matches!(
            self,
            Self::InvalidQuantity { .. }
                | Self::OfferingNotFound(_)
                | Self::OfferingClosed(_)
                | Self::InsufficientInventory { .. }
                | Self::ParticipantCapExceeded(_)
                | Self::RateLimitExceeded(_)
                | Self::ReservationNotFound(_)
                | Self::ReservationNotPending { .. }
                | Self::ReservationExpired(_)
                | Self::PromotionNotFound(_)
                | Self::PromotionInactive(_)
                | Self::PromotionNotStarted(_)
                | Self::PromotionEnded(_)
                | Self::PromotionUsageLimitReached { .. }
                | Self::PromotionMinimumNotMet { .. }
                | Self::PromotionNotApplicable { .. }
                | Self::InvalidDiscount(_)
        )
    }

    /// Short machine-readable code, used as a metrics label.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidQuantity { .. } => "invalid_quantity",
            Self::OfferingNotFound(_) => "offering_not_found",
            Self::OfferingClosed(_) => "offering_closed",
            Self::InsufficientInventory { .. } => "sold_out",
            Self::ParticipantCapExceeded(_) => "cap_exceeded",
            Self::RateLimitExceeded(_) => "rate_limited",
            Self::ReservationNotFound(_) => "reservation_not_found",
            Self::ReservationNotPending { .. } => "reservation_not_pending",
            Self::ReservationExpired(_) => "reservation_expired",
            Self::PromotionNotFound(_)
            | Self::PromotionInactive(_)
            | Self::PromotionNotStarted(_)
            | Self::PromotionEnded(_)
            | Self::PromotionUsageLimitReached { .. }
            | Self::PromotionMinimumNotMet { .. }
            | Self::PromotionNotApplicable { .. }
            | Self::InvalidDiscount(_) => "promotion_rejected",
            Self::LedgerUnavailable(_) => "ledger_unavailable",
            Self::LedgerNotInitialized(_) => "ledger_not_initialized",
            Self::PersistenceFailureAfterReserve { .. } => "persistence_failure",
            Self::Store(_) => "store_error",
        }
    }
}
