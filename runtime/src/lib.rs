//! # Raffle Runtime
//!
//! Services that sell raffle tickets without overselling.
//!
//! ## Components
//!
//! - **[`ReservationManager`]**: creates, cancels, validates and lists
//!   time-bounded reservations
//! - **[`PurchaseCompletion`]**: turns payment signals into tickets or released
//!   inventory, idempotently
//! - **[`ExpiryReaper`]**: reclaims inventory from abandoned reservations
//! - **[`PromotionLedger`]**: at-most-once promotion code usage per checkout
//! - **[`InventoryReconciler`]**: seeds ledger entries and reports drift
//!
//! All of them share a [`ReservationEnvironment`]: the inventory ledger, the
//! durable store, a clock, a notification sink and a retry policy.
//!
//! ## Flow
//!
//! ```text
//! create ──► ledger.reserve ──► store.insert (pending)
//!                                   │
//!            ┌──────────────────────┼───────────────────────┐
//!            ▼                      ▼                       ▼
//!     payment succeeded      cancel / payment failed    reaper (expired)
//!     store.confirm          store.claim                store.claim
//!     ledger.commit          ledger.release             ledger.release
//! ```
//!
//! ## Example
//!
//! ```rust
//! use raffle_core::{PaymentTransactionId, UserId};
//! use raffle_runtime::{
//!     PurchaseCompletion, ReservationEnvironment, ReservationManager, ReservationSettings,
//! };
//! use raffle_testing::{InMemoryLedger, InMemoryStore, OfferingBuilder};
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let store = InMemoryStore::new();
//! let offering = OfferingBuilder::new(chrono::Utc::now()).total_tickets(10).build();
//! store.put_offering(offering.clone());
//!
//! let env = ReservationEnvironment::new(Arc::new(InMemoryLedger::new()), Arc::new(store));
//! let reservations = ReservationManager::new(env.clone(), ReservationSettings::default());
//! let purchases = PurchaseCompletion::new(env);
//!
//! let reservation = reservations.create(offering.id, UserId::new(), 3).await?;
//! let outcome = purchases
//!     .on_payment_succeeded(reservation.id, PaymentTransactionId::new())
//!     .await?;
//! assert_eq!(outcome.tickets().len(), 3);
//! # Ok::<(), raffle_core::ReservationError>(())
//! # }).unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Shared dependencies and settle helpers
pub mod environment;

/// Prometheus metrics for observability
pub mod metrics;

/// Notification sinks
pub mod notifications;

/// Promotion code usage
pub mod promotion;

/// Payment completion
pub mod purchase;

/// Expiry sweep
pub mod reaper;

/// Ledger seeding and drift detection
pub mod reconcile;

/// Reservation lifecycle
pub mod reservation;

/// Retry logic with exponential backoff
pub mod retry;

pub use environment::ReservationEnvironment;
pub use notifications::{BroadcastNotifier, TracingNotifier};
pub use promotion::PromotionLedger;
pub use purchase::{PurchaseCompletion, PurchaseOutcome, SettleOutcome};
pub use reaper::{ExpiryReaper, ReapReport, ReaperConfig};
pub use reconcile::{DriftReport, InventoryReconciler, ReconcileReport, ReconcilerConfig};
pub use reservation::{ReservationManager, ReservationSettings};
pub use retry::RetryPolicy;
