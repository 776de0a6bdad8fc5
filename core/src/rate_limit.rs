//! Reservation rate limiting.
//!
//! Two sliding windows guard `create`: one per user across all offerings and
//! one per user and offering. A request is checked against both before any
//! inventory is held; the reservation is recorded in both after its row is
//! written. The check and the record are separate calls, so concurrent
//! requests of one user may overshoot a window by the number in flight.

use crate::error::Result;
use crate::types::{OfferingId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Which window denied a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitScope {
    /// Reservations by one user, any offering
    User,
    /// Reservations by one user for one offering
    UserOffering,
}

impl RateLimitScope {
    /// Limiter key for this scope.
    #[must_use]
    pub fn key(self, user_id: UserId, offering_id: OfferingId) -> String {
        match self {
            Self::User => format!("user:{user_id}"),
            Self::UserOffering => format!("user:{user_id}:offering:{offering_id}"),
        }
    }
}

impl fmt::Display for RateLimitScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => f.write_str("too many reservations"),
            Self::UserOffering => f.write_str("too many reservations for this offering"),
        }
    }
}

/// At most `max_reservations` within any `window`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitRule {
    /// Reservations allowed per window
    pub max_reservations: u32,
    /// Window length
    pub window: Duration,
}

impl RateLimitRule {
    /// `max_reservations` per hour.
    #[must_use]
    pub const fn per_hour(max_reservations: u32) -> Self {
        Self {
            max_reservations,
            window: Duration::from_secs(3600),
        }
    }
}

/// The windows enforced at reservation time; `None` disables a window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RateLimits {
    /// Window across all offerings
    pub per_user: Option<RateLimitRule>,
    /// Window per offering
    pub per_user_offering: Option<RateLimitRule>,
}

impl RateLimits {
    /// No limits.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            per_user: None,
            per_user_offering: None,
        }
    }

    /// Enabled windows with their scope.
    pub fn rules(&self) -> impl Iterator<Item = (RateLimitScope, RateLimitRule)> {
        [
            (RateLimitScope::User, self.per_user),
            (RateLimitScope::UserOffering, self.per_user_offering),
        ]
        .into_iter()
        .filter_map(|(scope, rule)| rule.map(|rule| (scope, rule)))
    }
}

/// Sliding-window counter store.
///
/// Object safe, so the environment can carry any backend behind an `Arc`.
/// Backends fail closed: an unreachable store is an error, never a zero count.
pub trait RateLimiter: Send + Sync {
    /// Entries recorded under `key` in `(now - window, now]`.
    ///
    /// # Errors
    ///
    /// Returns `LedgerUnavailable` if the backing store cannot be reached.
    fn recent(
        &self,
        key: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<u32>> + Send + '_>>;

    /// Record `member` under `key` at `now`. Entries older than `window` may
    /// be discarded.
    ///
    /// # Errors
    ///
    /// Returns `LedgerUnavailable` if the backing store cannot be reached.
    fn record(
        &self,
        key: &str,
        member: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// A limiter that never counts anything.
#[derive(Clone, Copy, Debug, Default)]
pub struct Unlimited;

impl RateLimiter for Unlimited {
    fn recent(
        &self,
        _key: &str,
        _window: Duration,
        _now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<u32>> + Send + '_>> {
        Box::pin(async { Ok(0) })
    }

    fn record(
        &self,
        _key: &str,
        _member: &str,
        _window: Duration,
        _now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async { Ok(()) })
    }
}
