//! Domain types for raffle ticket reservations.
//!
//! Entities reference each other by id only: an offering never owns its
//! reservations, a reservation never owns its tickets. Every lookup goes
//! through the ledger or the durable store by key.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            #[doc = concat!("Creates a new random `", stringify!($name), "`")]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            #[doc = concat!("Create a `", stringify!($name), "` from a `Uuid`")]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for an offering (a house raffled off by ticket sale)
    OfferingId
);
uuid_id!(
    /// Unique identifier for a reservation
    ReservationId
);
uuid_id!(
    /// Unique identifier for a buyer
    UserId
);
uuid_id!(
    /// Unique identifier for an issued ticket
    TicketId
);
uuid_id!(
    /// Identifier of a captured payment, supplied by the payment provider
    PaymentTransactionId
);
uuid_id!(
    /// Unique identifier for a promotion usage audit row
    PromotionUsageId
);

/// Opaque, unique token identifying a reservation's hold in the ledger.
///
/// Format: 32 hex characters of a v4 UUID, a dash, and a 6 digit random suffix.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReservationToken(String);

impl ReservationToken {
    /// Generate a fresh token.
    #[must_use]
    pub fn generate() -> Self {
        let suffix: u32 = rand::thread_rng().gen_range(100_000..1_000_000);
        Self(format!("{}-{suffix}", Uuid::new_v4().simple()))
    }

    /// Wrap an existing token (e.g. one loaded from storage).
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Borrow the token text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReservationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Money Value Object (cents-based to avoid floating point errors)
// ============================================================================

/// Represents money in cents to avoid floating-point arithmetic errors
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    /// Zero amount
    pub const ZERO: Self = Self(0);

    /// Creates a `Money` value from cents
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Returns the amount in cents
    #[must_use]
    pub const fn cents(&self) -> u64 {
        self.0
    }

    /// Multiplies money by a quantity with overflow checking
    #[must_use]
    pub const fn checked_multiply(self, quantity: u32) -> Option<Self> {
        match self.0.checked_mul(quantity as u64) {
            Some(result) => Some(Self(result)),
            None => None,
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

// ============================================================================
// Offering
// ============================================================================

/// Sales status of an offering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferingStatus {
    /// Announced, not yet selling
    Upcoming,
    /// Selling tickets
    Active,
    /// Temporarily not selling
    Paused,
    /// Lottery window closed
    Ended,
    /// Withdrawn
    Cancelled,
}

impl OfferingStatus {
    /// Convert status to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Upcoming => "upcoming",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Ended => "ended",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse status from its database string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "upcoming" => Some(Self::Upcoming),
            "active" => Some(Self::Active),
            "paused" => Some(Self::Paused),
            "ended" => Some(Self::Ended),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// A house whose raffle tickets are on sale.
///
/// Read-mostly reference data owned by the catalog; this subsystem never
/// mutates it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offering {
    /// Offering ID
    pub id: OfferingId,
    /// Display title
    pub title: String,
    /// Total tickets that will ever be sold
    pub total_tickets: u32,
    /// Price of one ticket
    pub ticket_price: Money,
    /// Maximum tickets a single user may hold (None = unlimited)
    pub max_tickets_per_user: Option<u32>,
    /// Maximum distinct participants (None = unlimited)
    pub max_participants: Option<u32>,
    /// Start of the lottery window (None = open since creation)
    pub opens_at: Option<DateTime<Utc>>,
    /// End of the lottery window
    pub closes_at: DateTime<Utc>,
    /// Sales status
    pub status: OfferingStatus,
}

impl Offering {
    /// Whether the offering accepts new reservations at `now`.
    #[must_use]
    pub fn accepts_entries(&self, now: DateTime<Utc>) -> bool {
        self.status == OfferingStatus::Active
            && self.opens_at.is_none_or(|opens_at| opens_at <= now)
            && now < self.closes_at
    }

    /// Participant limits the ledger enforces for this offering.
    #[must_use]
    pub const fn limits(&self) -> ParticipantLimits {
        ParticipantLimits {
            max_participants: self.max_participants,
            max_tickets_per_user: self.max_tickets_per_user,
        }
    }
}

/// Per-offering participation caps.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantLimits {
    /// Maximum distinct participants (None = unlimited)
    pub max_participants: Option<u32>,
    /// Maximum tickets per user, pending holds included (None = unlimited)
    pub max_tickets_per_user: Option<u32>,
}

/// Which participation cap denied an entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapKind {
    /// The offering already has its maximum number of distinct participants
    MaxParticipants,
    /// The user would exceed the per-user ticket maximum
    MaxTicketsPerUser,
}

impl fmt::Display for CapKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MaxParticipants => f.write_str("maximum participants reached"),
            Self::MaxTicketsPerUser => f.write_str("maximum tickets per user reached"),
        }
    }
}

// ============================================================================
// Reservation
// ============================================================================

/// Reservation lifecycle status.
///
/// `Pending` is the only non-terminal state; each terminal state is reached
/// through exactly one guarded claim.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    /// Holding inventory, awaiting payment
    Pending,
    /// Paid; tickets issued
    Confirmed,
    /// Cancelled by the user
    Cancelled,
    /// Abandoned past its expiry
    Expired,
    /// Payment failed or timed out
    Failed,
}

impl ReservationStatus {
    /// Convert status to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
            Self::Failed => "failed",
        }
    }

    /// Parse status from its database string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "confirmed" => Some(Self::Confirmed),
            "cancelled" => Some(Self::Cancelled),
            "expired" => Some(Self::Expired),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A time-bounded hold on ticket quantity pending payment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    /// Reservation ID
    pub id: ReservationId,
    /// Offering the tickets belong to
    pub offering_id: OfferingId,
    /// Buyer
    pub user_id: UserId,
    /// Number of tickets held
    pub quantity: u32,
    /// Ticket price at the time of reservation
    pub unit_price: Money,
    /// `unit_price * quantity`
    pub total_price: Money,
    /// Ledger hold token
    pub token: ReservationToken,
    /// Lifecycle status
    pub status: ReservationStatus,
    /// Hold expiry
    pub expires_at: DateTime<Utc>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last status change
    pub updated_at: DateTime<Utc>,
    /// When the reservation reached a terminal state
    pub processed_at: Option<DateTime<Utc>>,
    /// Payment that confirmed the reservation
    pub payment_transaction_id: Option<PaymentTransactionId>,
    /// Why the reservation failed or expired at confirmation
    pub error_message: Option<String>,
}

impl Reservation {
    /// Whether the reservation still holds inventory that can be paid for.
    #[must_use]
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.status == ReservationStatus::Pending && now < self.expires_at
    }
}

// ============================================================================
// Tickets
// ============================================================================

/// Ticket number, unique per offering and never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketNumber(u32);

impl TicketNumber {
    /// Wrap a raw sequence number.
    #[must_use]
    pub const fn new(n: u32) -> Self {
        Self(n)
    }

    /// Raw sequence number.
    #[must_use]
    pub const fn value(&self) -> u32 {
        self.0
    }

    /// Printable label, e.g. `3fa85f6457174562b3fc2c963f66afa6-000042`.
    #[must_use]
    pub fn label(&self, offering_id: &OfferingId) -> String {
        format!("{}-{:06}", offering_id.as_uuid().simple(), self.0)
    }
}

impl fmt::Display for TicketNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06}", self.0)
    }
}

/// Ticket status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    /// Valid entry in the draw
    Active,
    /// Voided
    Cancelled,
    /// Money returned
    Refunded,
    /// Draw finished without this ticket winning
    Expired,
}

impl TicketStatus {
    /// Convert status to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
            Self::Expired => "expired",
        }
    }

    /// Parse status from its database string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "cancelled" => Some(Self::Cancelled),
            "refunded" => Some(Self::Refunded),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }
}

/// A purchased raffle ticket. Created only when a reservation is confirmed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Ticket ID
    pub id: TicketId,
    /// Offering
    pub offering_id: OfferingId,
    /// Owner
    pub user_id: UserId,
    /// Reservation the ticket was issued from
    pub reservation_id: ReservationId,
    /// Number, unique within the offering
    pub number: TicketNumber,
    /// Status
    pub status: TicketStatus,
    /// Price paid
    pub purchase_price: Money,
    /// Payment that bought the ticket
    pub payment_transaction_id: PaymentTransactionId,
    /// Purchase time
    pub purchased_at: DateTime<Utc>,
}

// ============================================================================
// Promotions
// ============================================================================

/// A promotional code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Promotion {
    /// Code, stored upper-case
    pub code: String,
    /// Whether the code can be used at all
    pub active: bool,
    /// Start of validity (None = immediately)
    pub starts_at: Option<DateTime<Utc>>,
    /// End of validity (None = never)
    pub ends_at: Option<DateTime<Utc>>,
    /// How many times one user may use the code
    pub per_user_limit: u32,
    /// How many times the code may be used overall (None = unlimited)
    pub usage_limit: Option<u32>,
    /// Smallest checkout total the code applies to (None = any)
    #[serde(default)]
    pub min_purchase: Option<Money>,
    /// Offerings the code is restricted to (empty = all)
    #[serde(default)]
    pub applicable_offerings: Vec<OfferingId>,
}

impl Promotion {
    /// Canonical form of a user-entered code.
    #[must_use]
    pub fn normalize_code(code: &str) -> String {
        code.trim().to_uppercase()
    }

    /// Whether the code may be used on `offering_id`.
    #[must_use]
    pub fn applies_to(&self, offering_id: OfferingId) -> bool {
        self.applicable_offerings.is_empty() || self.applicable_offerings.contains(&offering_id)
    }

    /// Whether a checkout of `total` reaches the minimum purchase.
    #[must_use]
    pub fn meets_minimum(&self, total: Money) -> bool {
        self.min_purchase.is_none_or(|minimum| total >= minimum)
    }
}

/// Status of a promotion usage audit row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionUsageStatus {
    /// Applied to a checkout that has not completed
    Pending,
    /// Checkout paid; usage is final
    Resolved,
    /// Checkout abandoned; usage given back
    Reversed,
}

impl PromotionUsageStatus {
    /// Convert status to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Resolved => "resolved",
            Self::Reversed => "reversed",
        }
    }

    /// Parse status from its database string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "resolved" => Some(Self::Resolved),
            "reversed" => Some(Self::Reversed),
            _ => None,
        }
    }
}

/// Audit row recording one use of a promotion code against a checkout.
///
/// The checkout transaction a usage belongs to is the reservation being paid.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionUsage {
    /// Audit row ID
    pub id: PromotionUsageId,
    /// Checkout transaction (the reservation)
    pub transaction_id: ReservationId,
    /// User who applied the code
    pub user_id: UserId,
    /// Promotion code (normalized)
    pub code: String,
    /// Discount granted
    pub discount: Money,
    /// Audit status
    pub status: PromotionUsageStatus,
    /// When the code was applied
    pub created_at: DateTime<Utc>,
    /// When the usage was resolved or reversed
    pub settled_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Inventory
// ============================================================================

/// Read-only snapshot of an offering's ledger counters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventorySnapshot {
    /// Offering
    pub offering_id: OfferingId,
    /// Total tickets
    pub total: u32,
    /// Tickets nobody holds
    pub available: u32,
    /// Tickets held by pending reservations
    pub reserved: u32,
    /// Distinct participants
    pub participants: u32,
}

impl InventorySnapshot {
    /// Tickets the ledger considers sold (`total - available - reserved`).
    #[must_use]
    pub const fn committed(&self) -> u32 {
        self.total
            .saturating_sub(self.available)
            .saturating_sub(self.reserved)
    }

    /// Whether nothing can be reserved right now.
    #[must_use]
    pub const fn is_sold_out(&self) -> bool {
        self.available == 0
    }
}

/// A token-keyed hold, as seeded into an empty ledger or listed from a live one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldSeed {
    /// Reservation token
    pub token: ReservationToken,
    /// Holder
    pub user_id: UserId,
    /// Held quantity
    pub quantity: u32,
}

/// Everything needed to rebuild an offering's ledger entry from the durable store.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventorySeed {
    /// Total tickets
    pub total: u32,
    /// Tickets sold (active tickets in the store)
    pub sold: u32,
    /// Live pending holds
    pub holds: Vec<HoldSeed>,
    /// Tickets already owned per user
    pub holdings: Vec<(UserId, u32)>,
}

impl InventorySeed {
    /// Sum of pending hold quantities.
    #[must_use]
    pub fn reserved(&self) -> u32 {
        self.holds.iter().map(|h| h.quantity).sum()
    }

    /// Tickets neither sold nor held.
    #[must_use]
    pub fn available(&self) -> u32 {
        self.total
            .saturating_sub(self.sold)
            .saturating_sub(self.reserved())
    }
}

// ============================================================================
// Queries
// ============================================================================

/// Filter and pagination for listing a user's reservations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationQuery {
    /// Only reservations in this status
    pub status: Option<ReservationStatus>,
    /// 1-based page number
    pub page: Option<u32>,
    /// Page size
    pub limit: Option<u32>,
}

impl ReservationQuery {
    /// Default page size.
    pub const DEFAULT_LIMIT: u32 = 20;
    /// Largest page size served.
    pub const MAX_LIMIT: u32 = 100;

    /// Effective (page, limit), both at least 1 and limit capped.
    #[must_use]
    pub fn page_and_limit(&self) -> (u32, u32) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self
            .limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT);
        (page, limit)
    }

    /// Rows to skip for the effective page.
    #[must_use]
    pub fn offset(&self) -> u64 {
        let (page, limit) = self.page_and_limit();
        u64::from(page - 1) * u64::from(limit)
    }
}

/// One page of results.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items on this page
    pub items: Vec<T>,
    /// 1-based page number
    pub page: u32,
    /// Page size used
    pub limit: u32,
    /// Total matching items across all pages
    pub total: u64,
}

impl<T> Page<T> {
    /// Whether more pages follow this one.
    #[must_use]
    pub fn has_more(&self) -> bool {
        u64::from(self.page) * u64::from(self.limit) < self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn offering(now: DateTime<Utc>) -> Offering {
        Offering {
            id: OfferingId::new(),
            title: "Lakeside cottage".into(),
            total_tickets: 100,
            ticket_price: Money::from_cents(2_500),
            max_tickets_per_user: Some(10),
            max_participants: None,
            opens_at: Some(now - Duration::days(1)),
            closes_at: now + Duration::days(30),
            status: OfferingStatus::Active,
        }
    }

    #[test]
    fn test_offering_window() {
        let now = Utc::now();
        let mut o = offering(now);
        assert!(o.accepts_entries(now));

        o.status = OfferingStatus::Paused;
        assert!(!o.accepts_entries(now));

        o.status = OfferingStatus::Active;
        o.closes_at = now;
        assert!(!o.accepts_entries(now), "window end is exclusive");

        o.closes_at = now + Duration::days(1);
        o.opens_at = Some(now + Duration::hours(1));
        assert!(!o.accepts_entries(now));
    }

    #[test]
    fn test_status_round_trips_through_db_strings() {
        for status in [
            ReservationStatus::Pending,
            ReservationStatus::Confirmed,
            ReservationStatus::Cancelled,
            ReservationStatus::Expired,
            ReservationStatus::Failed,
        ] {
            assert_eq!(ReservationStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ReservationStatus::parse("completed"), None);
        assert!(!ReservationStatus::Pending.is_terminal());
        assert!(ReservationStatus::Expired.is_terminal());
    }

    #[test]
    fn test_token_format() {
        let token = ReservationToken::generate();
        let (uuid, suffix) = token.as_str().split_once('-').unwrap_or_default();
        assert_eq!(uuid.len(), 32);
        assert_eq!(suffix.len(), 6);
        assert_ne!(token, ReservationToken::generate());
    }

    #[test]
    fn test_ticket_number_label() {
        let id = OfferingId::from_uuid(Uuid::nil());
        assert_eq!(
            TicketNumber::new(42).label(&id),
            "00000000000000000000000000000000-000042"
        );
    }

    #[test]
    fn test_money_display_and_multiply() {
        let price = Money::from_cents(1_999);
        assert_eq!(price.to_string(), "19.99");
        assert_eq!(price.checked_multiply(3), Some(Money::from_cents(5_997)));
        assert_eq!(Money::from_cents(u64::MAX).checked_multiply(2), None);
    }

    #[test]
    fn test_query_pagination_defaults_and_cap() {
        let q = ReservationQuery::default();
        assert_eq!(q.page_and_limit(), (1, 20));
        assert_eq!(q.offset(), 0);

        let q = ReservationQuery {
            status: None,
            page: Some(3),
            limit: Some(500),
        };
        assert_eq!(q.page_and_limit(), (3, 100));
        assert_eq!(q.offset(), 200);

        let q = ReservationQuery {
            status: None,
            page: Some(0),
            limit: Some(0),
        };
        assert_eq!(q.page_and_limit(), (1, 1));
    }

    #[test]
    fn test_seed_counts() {
        let seed = InventorySeed {
            total: 10,
            sold: 3,
            holds: vec![HoldSeed {
                token: ReservationToken::new("t"),
                user_id: UserId::new(),
                quantity: 2,
            }],
            holdings: vec![],
        };
        assert_eq!(seed.reserved(), 2);
        assert_eq!(seed.available(), 5);
    }

    #[test]
    fn test_snapshot_committed() {
        let snap = InventorySnapshot {
            offering_id: OfferingId::new(),
            total: 10,
            available: 4,
            reserved: 3,
            participants: 2,
        };
        assert_eq!(snap.committed(), 3);
        assert!(!snap.is_sold_out());
    }

    #[test]
    fn test_promotion_restrictions() {
        let house = OfferingId::new();
        let mut promo = Promotion {
            code: "SPRING".into(),
            active: true,
            starts_at: None,
            ends_at: None,
            per_user_limit: 1,
            usage_limit: None,
            min_purchase: None,
            applicable_offerings: Vec::new(),
        };
        assert!(promo.applies_to(house));
        assert!(promo.meets_minimum(Money::ZERO));

        promo.applicable_offerings = vec![house];
        promo.min_purchase = Some(Money::from_cents(5_000));
        assert!(promo.applies_to(house));
        assert!(!promo.applies_to(OfferingId::new()));
        assert!(promo.meets_minimum(Money::from_cents(5_000)));
        assert!(!promo.meets_minimum(Money::from_cents(4_999)));
    }

    #[test]
    fn test_ids_serialize_transparently() {
        let id = ReservationId::from_uuid(Uuid::nil());
        let json = serde_json::to_string(&id).unwrap_or_default();
        assert_eq!(json, "\"00000000-0000-0000-0000-000000000000\"");
    }
}
