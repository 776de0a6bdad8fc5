//! # Raffle Core
//!
//! Domain types, error taxonomy and storage traits for selling a strictly
//! bounded pool of raffle tickets to concurrently competing buyers.
//!
//! ## Two sources of truth
//!
//! ```text
//!   "is there room?"                    "which reservation, in what state?"
//! ┌───────────────────┐               ┌──────────────────────────────────┐
//! │  InventoryLedger  │               │  ReservationStore / PromotionStore│
//! │ available/reserved│               │  reservations, tickets, usages    │
//! │ participants/holds│               │  guarded claims, transactions     │
//! └───────────────────┘               └──────────────────────────────────┘
//! ```
//!
//! Invariant per offering, at all times:
//!
//! ```text
//! available + reserved + sold == total
//! ```
//!
//! where `available`/`reserved` live in the ledger and `sold` in the store.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod environment;
pub mod error;
pub mod ledger;
pub mod rate_limit;
pub mod store;
pub mod types;

pub use environment::{Clock, InventoryChange, NotificationSink, ReservationEvent, SystemClock};
pub use error::{ReservationError, Result};
pub use ledger::{CapCheck, InventoryLedger, ReserveOutcome, ReserveRequest};
pub use rate_limit::{RateLimitRule, RateLimitScope, RateLimiter, RateLimits, Unlimited};
pub use store::{
    Claim, ClaimGuard, ClaimOutcome, ConfirmOutcome, OfferingCatalog, PromotionStore,
    ReservationStore, UsageOutcome,
};
pub use types::*;
