//! # Raffle Testing
//!
//! Testing utilities for the raffle reservation core.
//!
//! This crate provides:
//! - [`InMemoryLedger`]: an inventory ledger with the same semantics as the
//!   Redis scripts, one critical section per operation
//! - [`InMemoryStore`]: offerings, reservations, tickets and promotions in memory
//! - [`InMemoryRateLimiter`]: sliding reservation windows driven by the caller's clock
//! - Deterministic clocks ([`FixedClock`], [`ManualClock`])
//! - [`RecordingNotifier`]: captures published events
//! - Builders and proptest strategies for domain types
//!
//! Both backends support fault injection so fail-closed and compensation
//! paths can be exercised without real infrastructure.
//!
//! ## Example
//!
//! ```
//! use raffle_core::{InventoryLedger, InventorySeed, OfferingId};
//! use raffle_testing::InMemoryLedger;
//!
//! # tokio_test::block_on(async {
//! let ledger = InMemoryLedger::new();
//! let offering_id = OfferingId::new();
//! let seed = InventorySeed { total: 10, ..InventorySeed::default() };
//! assert!(ledger.initialize(offering_id, &seed).await.unwrap());
//! assert_eq!(ledger.available_count(offering_id).await.unwrap(), 10);
//! # });
//! ```

mod ledger;
mod notifier;
mod rate_limit;
mod store;

use chrono::{DateTime, Utc};
use raffle_core::environment::Clock;

pub use ledger::InMemoryLedger;
pub use notifier::RecordingNotifier;
pub use rate_limit::InMemoryRateLimiter;
pub use store::InMemoryStore;

/// Deterministic clocks.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use chrono::Duration;
    use std::sync::{Arc, Mutex};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use raffle_testing::mocks::FixedClock;
    /// use raffle_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that only moves when told to.
    ///
    /// Clones share the same time, so a test can hand one clone to the
    /// services and advance another past a reservation's expiry.
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<Mutex<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Create a clock starting at `time`
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(Mutex::new(time)),
            }
        }

        /// Jump to `time`
        pub fn set(&self, time: DateTime<Utc>) {
            let mut guard = self.time.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            *guard = time;
        }

        /// Move forward by `by`
        pub fn advance(&self, by: Duration) {
            let mut guard = self.time.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            *guard += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
        }
    }

    /// The instant every test clock starts at (2025-01-01 00:00:00 UTC).
    #[must_use]
    pub fn test_time() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_735_689_600, 0).unwrap_or_default()
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(test_time())
    }

    /// Create a manual clock starting at 2025-01-01 00:00:00 UTC
    #[must_use]
    pub fn manual_clock() -> ManualClock {
        ManualClock::new(test_time())
    }
}

/// Builders for domain fixtures.
pub mod helpers {
    use chrono::{DateTime, Duration, Utc};
    use raffle_core::{Money, Offering, OfferingId, OfferingStatus, Promotion};

    /// Fluent builder for [`Offering`] fixtures.
    ///
    /// Defaults: 100 tickets at 10.00, active, opened a day before `now` and
    /// closing 30 days after it, no caps.
    #[derive(Debug, Clone)]
    pub struct OfferingBuilder {
        offering: Offering,
    }

    impl OfferingBuilder {
        /// Start a builder relative to `now`
        #[must_use]
        pub fn new(now: DateTime<Utc>) -> Self {
            Self {
                offering: Offering {
                    id: OfferingId::new(),
                    title: "Test house".to_string(),
                    total_tickets: 100,
                    ticket_price: Money::from_cents(1_000),
                    max_tickets_per_user: None,
                    max_participants: None,
                    opens_at: Some(now - Duration::days(1)),
                    closes_at: now + Duration::days(30),
                    status: OfferingStatus::Active,
                },
            }
        }

        /// Set the ticket pool size
        #[must_use]
        pub const fn total_tickets(mut self, total: u32) -> Self {
            self.offering.total_tickets = total;
            self
        }

        /// Set the ticket price in cents
        #[must_use]
        pub const fn price_cents(mut self, cents: u64) -> Self {
            self.offering.ticket_price = Money::from_cents(cents);
            self
        }

        /// Cap tickets per user
        #[must_use]
        pub const fn max_tickets_per_user(mut self, max: u32) -> Self {
            self.offering.max_tickets_per_user = Some(max);
            self
        }

        /// Cap distinct participants
        #[must_use]
        pub const fn max_participants(mut self, max: u32) -> Self {
            self.offering.max_participants = Some(max);
            self
        }

        /// Set the sales status
        #[must_use]
        pub const fn status(mut self, status: OfferingStatus) -> Self {
            self.offering.status = status;
            self
        }

        /// Set the lottery window
        #[must_use]
        pub const fn window(mut self, opens_at: Option<DateTime<Utc>>, closes_at: DateTime<Utc>) -> Self {
            self.offering.opens_at = opens_at;
            self.offering.closes_at = closes_at;
            self
        }

        /// Finish
        #[must_use]
        pub fn build(self) -> Offering {
            self.offering
        }
    }

    /// An active, unbounded promotion usable once per user.
    #[must_use]
    pub fn promotion(code: &str) -> Promotion {
        Promotion {
            code: Promotion::normalize_code(code),
            active: true,
            starts_at: None,
            ends_at: None,
            per_user_limit: 1,
            usage_limit: None,
            min_purchase: None,
            applicable_offerings: Vec::new(),
        }
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use proptest::prelude::*;

    /// One step against a ledger in a generated history.
    #[derive(Debug, Clone)]
    pub enum LedgerOp {
        /// Reserve `quantity` for user number `user` under a fresh token
        Reserve {
            /// Index into the test's user pool
            user: usize,
            /// Tickets requested
            quantity: u32,
        },
        /// Release the n-th hold taken so far (modulo count)
        Release(usize),
        /// Commit the n-th hold taken so far (modulo count)
        Commit(usize),
    }

    /// Strategy for a single ledger step over `users` users.
    pub fn ledger_op(users: usize) -> impl Strategy<Value = LedgerOp> {
        prop_oneof![
            3 => (0..users, 1u32..=5).prop_map(|(user, quantity)| LedgerOp::Reserve { user, quantity }),
            1 => any::<usize>().prop_map(LedgerOp::Release),
            1 => any::<usize>().prop_map(LedgerOp::Commit),
        ]
    }
}

pub use helpers::{OfferingBuilder, promotion};
pub use mocks::{FixedClock, ManualClock, manual_clock, test_clock, test_time};
