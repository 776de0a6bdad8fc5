//! In-memory rate limiter.

use chrono::{DateTime, Utc};
use raffle_core::{RateLimiter, ReservationError, Result};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Entries = HashMap<String, Vec<(DateTime<Utc>, String)>>;

/// In-memory [`RateLimiter`] with the same sliding window as the Redis one.
///
/// Times come from the caller, so a [`ManualClock`](crate::ManualClock)
/// drives the window. Old entries are dropped when their key is touched.
/// Clones share state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRateLimiter {
    entries: Arc<Mutex<Entries>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryRateLimiter {
    /// Create an empty limiter
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with `LedgerUnavailable` until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Entries currently stored under `key`, expired or not.
    #[must_use]
    pub fn recorded(&self, key: &str) -> usize {
        self.entries
            .lock()
            .map(|entries| entries.get(key).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    fn apply<T>(
        &self,
        key: &str,
        window: Duration,
        now: DateTime<Utc>,
        f: impl FnOnce(&mut Vec<(DateTime<Utc>, String)>) -> T,
    ) -> Result<T> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ReservationError::LedgerUnavailable(
                "rate limiter switched off".to_string(),
            ));
        }
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| ReservationError::LedgerUnavailable("Mutex lock failed".to_string()))?;
        let window = chrono::Duration::from_std(window).unwrap_or(chrono::Duration::MAX);
        let key_entries = entries.entry(key.to_string()).or_default();
        key_entries.retain(|(at, _)| now.signed_duration_since(*at) < window);
        Ok(f(key_entries))
    }
}

impl RateLimiter for InMemoryRateLimiter {
    fn recent(
        &self,
        key: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<u32>> + Send + '_>> {
        let count = self.apply(key, window, now, |entries| {
            u32::try_from(entries.iter().filter(|(at, _)| *at <= now).count()).unwrap_or(u32::MAX)
        });
        Box::pin(async move { count })
    }

    fn record(
        &self,
        key: &str,
        member: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let member = member.to_string();
        let recorded = self.apply(key, window, now, |entries| {
            if !entries.iter().any(|(_, m)| *m == member) {
                entries.push((now, member));
            }
        });
        Box::pin(async move { recorded })
    }
}
