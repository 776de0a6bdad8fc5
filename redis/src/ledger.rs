//! `RedisInventoryLedger`: the inventory ledger on Redis.

use crate::rate_limit::RedisRateLimiter;
use crate::scripts;
use raffle_core::{
    CapCheck, CapKind, HoldSeed, InventoryLedger, InventorySeed, InventorySnapshot, OfferingId,
    ParticipantLimits, ReservationError, ReservationToken, ReserveOutcome, ReserveRequest, Result,
    UserId,
};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

const CAP_PARTICIPANTS: i64 = 4;
const CAP_PER_USER: i64 = 5;

/// Default key prefix.
pub const DEFAULT_KEY_PREFIX: &str = "raffle";

struct Scripts {
    initialize: Script,
    reserve: Script,
    release: Script,
    commit: Script,
    check_cap: Script,
    add_participant: Script,
}

impl Scripts {
    fn load() -> Self {
        Self {
            initialize: Script::new(scripts::INITIALIZE),
            reserve: Script::new(scripts::RESERVE),
            release: Script::new(scripts::RELEASE),
            commit: Script::new(scripts::COMMIT),
            check_cap: Script::new(scripts::CHECK_CAP),
            add_participant: Script::new(scripts::ADD_PARTICIPANT),
        }
    }
}

/// Inventory ledger on Redis.
///
/// Every mutation is a single Lua script, so the availability check and the
/// counter update can never interleave with another buyer's. Counters carry no
/// TTL. All keys of an offering share a hash tag (`{<offering id>}`) and land on
/// the same cluster slot.
///
/// Connection failures surface as `LedgerUnavailable`; callers fail closed.
///
/// # Example
///
/// ```no_run
/// use raffle_core::{InventoryLedger, OfferingId};
/// use raffle_redis::RedisInventoryLedger;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let ledger = RedisInventoryLedger::new("redis://127.0.0.1:6379").await?;
/// let available = ledger.available_count(OfferingId::new()).await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RedisInventoryLedger {
    conn_manager: ConnectionManager,
    prefix: String,
    scripts: Arc<Scripts>,
}

impl RedisInventoryLedger {
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
            scripts: Arc::new(Scripts::load()),
        }
    }

    /// Namespace keys under `prefix` instead of `raffle`.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// A rate limiter on the same connection and key prefix.
    #[must_use]
    pub fn rate_limiter(&self) -> RedisRateLimiter {
        RedisRateLimiter::from_manager(self.conn_manager.clone()).with_prefix(self.prefix.clone())
    }

    fn keys(&self, offering_id: OfferingId) -> [String; 4] {
        let base = format!("{}:{{{offering_id}}}", self.prefix);
        [
            format!("{base}:inventory"),
            format!("{base}:participants"),
            format!("{base}:holdings"),
            format!("{base}:holds"),
        ]
    }

    async fn run<T: redis::FromRedisValue>(
        &self,
        script: &Script,
        offering_id: OfferingId,
        args: &[String],
        operation: &'static str,
    ) -> Result<T> {
        let mut conn = self.conn_manager.clone();
        let mut invocation = script.prepare_invoke();
        for key in self.keys(offering_id) {
            invocation.key(key);
        }
        for arg in args {
            invocation.arg(arg);
        }
        invocation.invoke_async(&mut conn).await.map_err(|e| {
            tracing::warn!(offering_id = %offering_id, operation, error = %e, "Ledger call failed");
            ReservationError::LedgerUnavailable(format!("{operation} failed: {e}"))
        })
    }
}

fn limit_arg(limit: Option<u32>) -> String {
    limit.map_or_else(|| "-1".to_string(), |l| l.to_string())
}

fn cap_kind(code: i64) -> Option<CapKind> {
    match code {
        CAP_PARTICIPANTS => Some(CapKind::MaxParticipants),
        CAP_PER_USER => Some(CapKind::MaxTicketsPerUser),
        _ => None,
    }
}

fn to_u32(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

/// Decode a holds-hash field: `token -> "<user id>:<quantity>"`.
fn parse_hold(token: String, value: &str) -> Option<HoldSeed> {
    let (user, quantity) = value.rsplit_once(':')?;
    Some(HoldSeed {
        token: ReservationToken::new(token),
        user_id: UserId::from_uuid(Uuid::parse_str(user).ok()?),
        quantity: quantity.parse().ok()?,
    })
}

impl InventoryLedger for RedisInventoryLedger {
    async fn initialize(&self, offering_id: OfferingId, seed: &InventorySeed) -> Result<bool> {
        let mut args = vec![
            seed.total.to_string(),
            seed.sold.to_string(),
            seed.holds.len().to_string(),
        ];
        for hold in &seed.holds {
            args.push(hold.token.to_string());
            args.push(hold.user_id.to_string());
            args.push(hold.quantity.to_string());
        }
        for (user_id, owned) in &seed.holdings {
            args.push(user_id.to_string());
            args.push(owned.to_string());
        }

        let created: i64 = self
            .run(&self.scripts.initialize, offering_id, &args, "initialize")
            .await?;
        Ok(created == 1)
    }

    async fn reserve(&self, request: &ReserveRequest) -> Result<ReserveOutcome> {
        let args = [
            request.token.to_string(),
            request.user_id.to_string(),
            request.quantity.to_string(),
            limit_arg(request.limits.max_participants),
            limit_arg(request.limits.max_tickets_per_user),
        ];
        let (code, available): (i64, i64) = self
            .run(&self.scripts.reserve, request.offering_id, &args, "reserve")
            .await?;

        Ok(match code {
            1 => ReserveOutcome::Reserved,
            2 => ReserveOutcome::AlreadyHeld,
            3 => ReserveOutcome::InsufficientInventory {
                available: to_u32(available),
            },
            0 => ReserveOutcome::NotInitialized,
            other => match cap_kind(other) {
                Some(kind) => ReserveOutcome::CapExceeded(kind),
                None => {
                    return Err(ReservationError::LedgerUnavailable(format!(
                        "unexpected reserve reply {other}"
                    )));
                }
            },
        })
    }

    async fn release(&self, offering_id: OfferingId, token: &ReservationToken) -> Result<bool> {
        let released: i64 = self
            .run(&self.scripts.release, offering_id, &[token.to_string()], "release")
            .await?;
        Ok(released == 1)
    }

    async fn commit(&self, offering_id: OfferingId, token: &ReservationToken) -> Result<bool> {
        let committed: i64 = self
            .run(&self.scripts.commit, offering_id, &[token.to_string()], "commit")
            .await?;
        Ok(committed == 1)
    }

    async fn available_count(&self, offering_id: OfferingId) -> Result<u32> {
        let [inventory, ..] = self.keys(offering_id);
        let mut conn = self.conn_manager.clone();
        let available: Option<i64> = conn
            .hget(&inventory, "available")
            .await
            .map_err(|e| ReservationError::LedgerUnavailable(format!("available_count failed: {e}")))?;
        available
            .map(to_u32)
            .ok_or(ReservationError::LedgerNotInitialized(offering_id))
    }

    async fn status(&self, offering_id: OfferingId) -> Result<Option<InventorySnapshot>> {
        let [inventory, participants, ..] = self.keys(offering_id);
        let mut conn = self.conn_manager.clone();
        let ((total, available, reserved), participant_count): (
            (Option<i64>, Option<i64>, Option<i64>),
            i64,
        ) = redis::pipe()
            .atomic()
            .hget(&inventory, &["total", "available", "reserved"])
            .scard(&participants)
            .query_async(&mut conn)
            .await
            .map_err(|e| ReservationError::LedgerUnavailable(format!("status failed: {e}")))?;

        Ok(match (total, available, reserved) {
            (Some(total), Some(available), Some(reserved)) => Some(InventorySnapshot {
                offering_id,
                total: to_u32(total),
                available: to_u32(available),
                reserved: to_u32(reserved),
                participants: to_u32(participant_count),
            }),
            _ => None,
        })
    }

    async fn holds(&self, offering_id: OfferingId) -> Result<Vec<HoldSeed>> {
        let [.., holds] = self.keys(offering_id);
        let mut conn = self.conn_manager.clone();
        let raw: HashMap<String, String> = conn
            .hgetall(&holds)
            .await
            .map_err(|e| ReservationError::LedgerUnavailable(format!("holds failed: {e}")))?;

        Ok(raw
            .into_iter()
            .filter_map(|(token, value)| {
                let hold = parse_hold(token, &value);
                if hold.is_none() {
                    tracing::warn!(offering_id = %offering_id, value, "Skipping malformed hold entry");
                }
                hold
            })
            .collect())
    }

    async fn check_participant_cap(
        &self,
        offering_id: OfferingId,
        user_id: UserId,
        quantity: u32,
        limits: &ParticipantLimits,
    ) -> Result<CapCheck> {
        let args = [
            user_id.to_string(),
            quantity.to_string(),
            limit_arg(limits.max_participants),
            limit_arg(limits.max_tickets_per_user),
        ];
        let code: i64 = self
            .run(&self.scripts.check_cap, offering_id, &args, "check_participant_cap")
            .await?;
        Ok(cap_kind(code).map_or(CapCheck::Allowed, CapCheck::Exceeded))
    }

    async fn add_participant(
        &self,
        offering_id: OfferingId,
        user_id: UserId,
        max_participants: Option<u32>,
    ) -> Result<bool> {
        let args = [user_id.to_string(), limit_arg(max_participants)];
        let added: i64 = self
            .run(&self.scripts.add_participant, offering_id, &args, "add_participant")
            .await?;
        match added {
            -1 => Err(ReservationError::LedgerNotInitialized(offering_id)),
            n => Ok(n == 1),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_args() {
        assert_eq!(limit_arg(None), "-1");
        assert_eq!(limit_arg(Some(12)), "12");
    }

    #[test]
    fn test_cap_codes() {
        assert_eq!(cap_kind(4), Some(CapKind::MaxParticipants));
        assert_eq!(cap_kind(5), Some(CapKind::MaxTicketsPerUser));
        assert_eq!(cap_kind(0), None);
    }

    #[test]
    fn test_hold_entries_decode() {
        let user = UserId::new();
        let hold = parse_hold("tok".to_string(), &format!("{user}:3")).unwrap();
        assert_eq!(hold.token, ReservationToken::new("tok"));
        assert_eq!((hold.user_id, hold.quantity), (user, 3));

        assert!(parse_hold("tok".to_string(), "not-a-user:3").is_none());
        assert!(parse_hold("tok".to_string(), "garbage").is_none());
    }

    #[test]
    fn test_negative_counters_clamp_to_zero() {
        assert_eq!(to_u32(-3), 0);
        assert_eq!(to_u32(7), 7);
    }
}
