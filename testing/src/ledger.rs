//! In-memory inventory ledger.

use raffle_core::ledger::{CapCheck, InventoryLedger, ReserveOutcome, ReserveRequest};
use raffle_core::{
    CapKind, HoldSeed, InventorySeed, InventorySnapshot, OfferingId, ParticipantLimits, ReservationError,
    ReservationToken, Result, UserId,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Entry {
    total: u32,
    available: u32,
    reserved: u32,
    participants: HashSet<UserId>,
    holdings: HashMap<UserId, u32>,
    holds: HashMap<ReservationToken, (UserId, u32)>,
}

impl Entry {
    fn cap_check(&self, user_id: UserId, quantity: u32, limits: &ParticipantLimits) -> CapCheck {
        let held = self.holdings.get(&user_id).copied().unwrap_or(0);
        if limits
            .max_tickets_per_user
            .is_some_and(|max| held.saturating_add(quantity) > max)
        {
            return CapCheck::Exceeded(CapKind::MaxTicketsPerUser);
        }
        if !self.participants.contains(&user_id)
            && limits
                .max_participants
                .is_some_and(|max| self.participants.len() >= max as usize)
        {
            return CapCheck::Exceeded(CapKind::MaxParticipants);
        }
        CapCheck::Allowed
    }

    fn snapshot(&self, offering_id: OfferingId) -> InventorySnapshot {
        InventorySnapshot {
            offering_id,
            total: self.total,
            available: self.available,
            reserved: self.reserved,
            participants: u32::try_from(self.participants.len()).unwrap_or(u32::MAX),
        }
    }
}

/// In-memory [`InventoryLedger`].
///
/// Each operation runs inside one mutex critical section, the in-process
/// equivalent of a Redis Lua script. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedger {
    entries: Arc<Mutex<HashMap<OfferingId, Entry>>>,
    unavailable: Arc<AtomicBool>,
    transient_failures: Arc<AtomicU32>,
}

impl InMemoryLedger {
    /// Create an empty ledger
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with `LedgerUnavailable` until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make the next `n` calls fail with `LedgerUnavailable`.
    pub fn fail_next(&self, n: u32) {
        self.transient_failures.store(n, Ordering::SeqCst);
    }

    /// Number of live holds for an offering (for assertions).
    #[must_use]
    pub fn hold_count(&self, offering_id: OfferingId) -> usize {
        self.entries
            .lock()
            .map(|entries| entries.get(&offering_id).map_or(0, |e| e.holds.len()))
            .unwrap_or(0)
    }

    fn guard(&self) -> Result<MutexGuard<'_, HashMap<OfferingId, Entry>>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ReservationError::LedgerUnavailable(
                "ledger switched off".to_string(),
            ));
        }
        if self
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ReservationError::LedgerUnavailable(
                "injected transient failure".to_string(),
            ));
        }
        self.entries
            .lock()
            .map_err(|_| ReservationError::LedgerUnavailable("Mutex lock failed".to_string()))
    }
}

impl InventoryLedger for InMemoryLedger {
    async fn initialize(&self, offering_id: OfferingId, seed: &InventorySeed) -> Result<bool> {
        let mut entries = self.guard()?;
        if entries.contains_key(&offering_id) {
            return Ok(false);
        }

        let mut entry = Entry {
            total: seed.total,
            available: seed.available(),
            reserved: seed.reserved(),
            ..Entry::default()
        };
        for (user_id, owned) in &seed.holdings {
            *entry.holdings.entry(*user_id).or_default() += owned;
            entry.participants.insert(*user_id);
        }
        for hold in &seed.holds {
            *entry.holdings.entry(hold.user_id).or_default() += hold.quantity;
            entry.participants.insert(hold.user_id);
            entry
                .holds
                .insert(hold.token.clone(), (hold.user_id, hold.quantity));
        }
        entries.insert(offering_id, entry);
        Ok(true)
    }

    async fn reserve(&self, request: &ReserveRequest) -> Result<ReserveOutcome> {
        let mut entries = self.guard()?;
        let Some(entry) = entries.get_mut(&request.offering_id) else {
            return Ok(ReserveOutcome::NotInitialized);
        };
        if entry.holds.contains_key(&request.token) {
            return Ok(ReserveOutcome::AlreadyHeld);
        }
        if let CapCheck::Exceeded(kind) =
            entry.cap_check(request.user_id, request.quantity, &request.limits)
        {
            return Ok(ReserveOutcome::CapExceeded(kind));
        }
        if entry.available < request.quantity {
            return Ok(ReserveOutcome::InsufficientInventory {
                available: entry.available,
            });
        }

        entry.available -= request.quantity;
        entry.reserved += request.quantity;
        *entry.holdings.entry(request.user_id).or_default() += request.quantity;
        entry.participants.insert(request.user_id);
        entry
            .holds
            .insert(request.token.clone(), (request.user_id, request.quantity));
        Ok(ReserveOutcome::Reserved)
    }

    async fn release(&self, offering_id: OfferingId, token: &ReservationToken) -> Result<bool> {
        let mut entries = self.guard()?;
        let Some(entry) = entries.get_mut(&offering_id) else {
            return Ok(false);
        };
        let Some((user_id, quantity)) = entry.holds.remove(token) else {
            return Ok(false);
        };

        entry.reserved = entry.reserved.saturating_sub(quantity);
        entry.available = (entry.available + quantity).min(entry.total);
        let remaining = entry
            .holdings
            .get(&user_id)
            .copied()
            .unwrap_or(0)
            .saturating_sub(quantity);
        if remaining == 0 {
            entry.holdings.remove(&user_id);
            entry.participants.remove(&user_id);
        } else {
            entry.holdings.insert(user_id, remaining);
        }
        Ok(true)
    }

    async fn commit(&self, offering_id: OfferingId, token: &ReservationToken) -> Result<bool> {
        let mut entries = self.guard()?;
        let Some(entry) = entries.get_mut(&offering_id) else {
            return Ok(false);
        };
        let Some((_, quantity)) = entry.holds.remove(token) else {
            return Ok(false);
        };
        entry.reserved = entry.reserved.saturating_sub(quantity);
        Ok(true)
    }

    async fn available_count(&self, offering_id: OfferingId) -> Result<u32> {
        self.guard()?
            .get(&offering_id)
            .map(|e| e.available)
            .ok_or(ReservationError::LedgerNotInitialized(offering_id))
    }

    async fn status(&self, offering_id: OfferingId) -> Result<Option<InventorySnapshot>> {
        Ok(self.guard()?.get(&offering_id).map(|e| e.snapshot(offering_id)))
    }

    async fn holds(&self, offering_id: OfferingId) -> Result<Vec<HoldSeed>> {
        Ok(self.guard()?.get(&offering_id).map_or_else(Vec::new, |e| {
            e.holds
                .iter()
                .map(|(token, (user_id, quantity))| HoldSeed {
                    token: token.clone(),
                    user_id: *user_id,
                    quantity: *quantity,
                })
                .collect()
        }))
    }

    async fn check_participant_cap(
        &self,
        offering_id: OfferingId,
        user_id: UserId,
        quantity: u32,
        limits: &ParticipantLimits,
    ) -> Result<CapCheck> {
        let entries = self.guard()?;
        Ok(entries
            .get(&offering_id)
            .map_or(CapCheck::Allowed, |e| e.cap_check(user_id, quantity, limits)))
    }

    async fn add_participant(
        &self,
        offering_id: OfferingId,
        user_id: UserId,
        max_participants: Option<u32>,
    ) -> Result<bool> {
        let mut entries = self.guard()?;
        let entry = entries
            .get_mut(&offering_id)
            .ok_or(ReservationError::LedgerNotInitialized(offering_id))?;
        if entry.participants.contains(&user_id) {
            return Ok(true);
        }
        if max_participants.is_some_and(|max| entry.participants.len() >= max as usize) {
            return Ok(false);
        }
        entry.participants.insert(user_id);
        Ok(true)
    }
}
