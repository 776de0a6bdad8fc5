//! `RedisRateLimiter`: reservation windows on Redis sorted sets.

use crate::ledger::DEFAULT_KEY_PREFIX;
use chrono::{DateTime, Utc};
use raffle_core::{RateLimiter, ReservationError, Result};
use redis::Client;
use redis::aio::ConnectionManager;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Sliding-window limiter on Redis.
///
/// Each key is a sorted set of members scored by their record time in
/// milliseconds. Old members are trimmed and the rest counted in one atomic
/// pipeline; every record refreshes the key's expiry to the window length, so
/// idle keys disappear on their own.
///
/// # Example
///
/// ```no_run
/// use raffle_core::RateLimiter;
/// use raffle_redis::RedisRateLimiter;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let limiter = RedisRateLimiter::new("redis://127.0.0.1:6379").await?;
/// let recent = limiter
///     .recent("user:42", Duration::from_secs(3600), chrono::Utc::now())
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RedisRateLimiter {
    conn_manager: ConnectionManager,
    prefix: String,
}

impl RedisRateLimiter {
    /// Connect to Redis.
    ///
    /// # Errors
    ///
    /// Returns `LedgerUnavailable` if the client cannot be created or the
    /// first connection fails.
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url).map_err(|e| {
            ReservationError::LedgerUnavailable(format!("Failed to create Redis client: {e}"))
        })?;
        let conn_manager = ConnectionManager::new(client).await.map_err(|e| {
            ReservationError::LedgerUnavailable(format!(
                "Failed to create Redis connection manager: {e}"
            ))
        })?;
        Ok(Self::from_manager(conn_manager))
    }

    /// Wrap an existing connection manager.
    #[must_use]
    pub fn from_manager(conn_manager: ConnectionManager) -> Self {
        Self {
            conn_manager,
            prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }

    /// Namespace keys under `prefix` instead of `raffle`.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    fn rate_key(&self, key: &str) -> String {
        format!("{}:rate_limit:{key}", self.prefix)
    }
}

fn window_ms(window: Duration) -> i64 {
    i64::try_from(window.as_millis()).unwrap_or(i64::MAX).max(1)
}

impl RateLimiter for RedisRateLimiter {
    fn recent(
        &self,
        key: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<u32>> + Send + '_>> {
        let rate_key = self.rate_key(key);
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let window_start = now.timestamp_millis().saturating_sub(window_ms(window));
            let (count,): (u64,) = redis::pipe()
                .atomic()
                .zrembyscore(&rate_key, "-inf", window_start)
                .ignore()
                .zcard(&rate_key)
                .query_async(&mut conn)
                .await
                .map_err(|e| {
                    tracing::warn!(key = %rate_key, error = %e, "Rate limit lookup failed");
                    ReservationError::LedgerUnavailable(format!("rate limit lookup failed: {e}"))
                })?;
            Ok(u32::try_from(count).unwrap_or(u32::MAX))
        })
    }

    fn record(
        &self,
        key: &str,
        member: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let rate_key = self.rate_key(key);
        let member = member.to_string();
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let () = redis::pipe()
                .atomic()
                .zadd(&rate_key, member, now.timestamp_millis())
                .ignore()
                .pexpire(&rate_key, window_ms(window))
                .ignore()
                .query_async(&mut conn)
                .await
                .map_err(|e| {
                    ReservationError::LedgerUnavailable(format!("rate limit record failed: {e}"))
                })?;
            Ok(())
        })
    }
}
