//! In-memory durable store.

use chrono::{DateTime, Utc};
use raffle_core::store::{
    Claim, ClaimGuard, ClaimOutcome, ConfirmOutcome, OfferingCatalog, PromotionStore,
    ReservationStore, UsageOutcome,
};
use raffle_core::{
    HoldSeed, InventorySeed, Offering, OfferingId, Page, PaymentTransactionId, Promotion,
    PromotionUsage, PromotionUsageStatus, Reservation, ReservationError, ReservationId,
    ReservationQuery, ReservationStatus, ReservationToken, Result, Ticket, TicketId,
    TicketNumber, TicketStatus, UserId,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct State {
    offerings: HashMap<OfferingId, Offering>,
    reservations: HashMap<ReservationId, Reservation>,
    tickets: Vec<Ticket>,
    ticket_counters: HashMap<OfferingId, u32>,
    promotions: HashMap<String, Promotion>,
    usages: Vec<PromotionUsage>,
}

impl State {
    fn active_usage_count(&self, code: &str, user_id: Option<UserId>) -> usize {
        self.usages
            .iter()
            .filter(|u| u.code == code && u.status != PromotionUsageStatus::Reversed)
            .filter(|u| user_id.is_none_or(|user| u.user_id == user))
            .count()
    }

    fn settle(&mut self, transaction_id: ReservationId, to: PromotionUsageStatus, at: DateTime<Utc>) -> u64 {
        let mut changed = 0;
        for usage in self
            .usages
            .iter_mut()
            .filter(|u| u.transaction_id == transaction_id && u.status == PromotionUsageStatus::Pending)
        {
            usage.status = to;
            usage.settled_at = Some(at);
            changed += 1;
        }
        changed
    }
}

/// In-memory implementation of [`OfferingCatalog`], [`ReservationStore`] and
/// [`PromotionStore`].
///
/// Every operation, including the confirmation transaction, runs under one
/// lock so each is observed atomically. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
    unavailable: Arc<AtomicBool>,
    failing_inserts: Arc<AtomicBool>,
    failing_claims: Arc<Mutex<HashSet<ReservationId>>>,
}

impl InMemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an offering.
    pub fn put_offering(&self, offering: Offering) {
        if let Ok(mut state) = self.state.lock() {
            state.offerings.insert(offering.id, offering);
        }
    }

    /// Add or replace a promotion.
    pub fn put_promotion(&self, promotion: Promotion) {
        if let Ok(mut state) = self.state.lock() {
            state.promotions.insert(promotion.code.clone(), promotion);
        }
    }

    /// Make every call fail with `Store` until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make `insert_reservation` fail while leaving everything else working.
    pub fn fail_inserts(&self, fail: bool) {
        self.failing_inserts.store(fail, Ordering::SeqCst);
    }

    /// Make `claim` fail for one reservation while leaving the rest working.
    pub fn fail_claims(&self, reservation_id: ReservationId, fail: bool) {
        if let Ok(mut failing) = self.failing_claims.lock() {
            if fail {
                failing.insert(reservation_id);
            } else {
                failing.remove(&reservation_id);
            }
        }
    }

    /// All tickets of an offering, ordered by number
    #[must_use]
    pub fn tickets_for_offering(&self, offering_id: OfferingId) -> Vec<Ticket> {
        let mut tickets: Vec<Ticket> = self
            .state
            .lock()
            .map(|s| {
                s.tickets
                    .iter()
                    .filter(|t| t.offering_id == offering_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        tickets.sort_by_key(|t| t.number);
        tickets
    }

    /// Σ quantity over pending and confirmed reservations of an offering
    #[must_use]
    pub fn committed_quantity(&self, offering_id: OfferingId) -> u32 {
        self.state
            .lock()
            .map(|s| {
                s.reservations
                    .values()
                    .filter(|r| {
                        r.offering_id == offering_id
                            && matches!(
                                r.status,
                                ReservationStatus::Pending | ReservationStatus::Confirmed
                            )
                    })
                    .map(|r| r.quantity)
                    .sum()
            })
            .unwrap_or(0)
    }

    /// Overwrite a stored reservation (for arranging edge cases).
    pub fn put_reservation(&self, reservation: Reservation) {
        if let Ok(mut state) = self.state.lock() {
            state.reservations.insert(reservation.id, reservation);
        }
    }

    fn guard(&self) -> Result<MutexGuard<'_, State>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ReservationError::Store("store switched off".to_string()));
        }
        self.state
            .lock()
            .map_err(|_| ReservationError::Store("Mutex lock failed".to_string()))
    }
}

impl OfferingCatalog for InMemoryStore {
    async fn get_offering(&self, offering_id: OfferingId) -> Result<Option<Offering>> {
        Ok(self.guard()?.offerings.get(&offering_id).cloned())
    }

    async fn open_offerings(&self, now: DateTime<Utc>) -> Result<Vec<Offering>> {
        let state = self.guard()?;
        let mut open: Vec<Offering> = state
            .offerings
            .values()
            .filter(|o| o.accepts_entries(now))
            .cloned()
            .collect();
        open.sort_by_key(|o| o.closes_at);
        Ok(open)
    }
}

impl ReservationStore for InMemoryStore {
    async fn insert_reservation(&self, reservation: &Reservation) -> Result<()> {
        if self.failing_inserts.load(Ordering::SeqCst) {
            return Err(ReservationError::Store("insert rejected".to_string()));
        }
        let mut state = self.guard()?;
        if state.reservations.contains_key(&reservation.id)
            || state
                .reservations
                .values()
                .any(|r| r.token == reservation.token)
        {
            return Err(ReservationError::Store(format!(
                "duplicate reservation {}",
                reservation.id
            )));
        }
        state.reservations.insert(reservation.id, reservation.clone());
        Ok(())
    }

    async fn get_reservation(&self, reservation_id: ReservationId) -> Result<Option<Reservation>> {
        Ok(self.guard()?.reservations.get(&reservation_id).cloned())
    }

    async fn reservation_by_token(&self, token: &ReservationToken) -> Result<Option<Reservation>> {
        Ok(self
            .guard()?
            .reservations
            .values()
            .find(|r| &r.token == token)
            .cloned())
    }

    async fn list_user_reservations(
        &self,
        user_id: UserId,
        query: &ReservationQuery,
    ) -> Result<Page<Reservation>> {
        let state = self.guard()?;
        let mut matching: Vec<&Reservation> = state
            .reservations
            .values()
            .filter(|r| r.user_id == user_id && query.status.is_none_or(|s| r.status == s))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let (page, limit) = query.page_and_limit();
        let offset = usize::try_from(query.offset()).unwrap_or(usize::MAX);
        Ok(Page {
            total: matching.len() as u64,
            items: matching
                .into_iter()
                .skip(offset)
                .take(limit as usize)
                .cloned()
                .collect(),
            page,
            limit,
        })
    }

    async fn claim(&self, reservation_id: ReservationId, claim: &Claim) -> Result<ClaimOutcome> {
        if self
            .failing_claims
            .lock()
            .is_ok_and(|failing| failing.contains(&reservation_id))
        {
            return Err(ReservationError::Store(format!(
                "claim rejected for {reservation_id}"
            )));
        }
        let mut state = self.guard()?;
        let Some(row) = state.reservations.get_mut(&reservation_id) else {
            return Ok(ClaimOutcome::NotFound);
        };
        let guard_holds = match claim.guard {
            ClaimGuard::Any => true,
            ClaimGuard::Owner(user_id) => {
                if row.user_id != user_id {
                    return Ok(ClaimOutcome::NotFound);
                }
                true
            }
            ClaimGuard::ExpiredBy(now) => row.expires_at <= now,
        };
        if row.status != ReservationStatus::Pending || !guard_holds {
            return Ok(ClaimOutcome::Lost(row.clone()));
        }

        row.status = claim.target;
        row.updated_at = claim.at;
        row.processed_at = Some(claim.at);
        if claim.error_message.is_some() {
            row.error_message.clone_from(&claim.error_message);
        }
        Ok(ClaimOutcome::Claimed(row.clone()))
    }

    async fn confirm(
        &self,
        reservation_id: ReservationId,
        payment_transaction_id: PaymentTransactionId,
        at: DateTime<Utc>,
    ) -> Result<ConfirmOutcome> {
        let mut state = self.guard()?;
        let Some(row) = state.reservations.get(&reservation_id).cloned() else {
            return Ok(ConfirmOutcome::NotFound);
        };
        if !row.is_live(at) {
            return Ok(ConfirmOutcome::Lost(row));
        }

        let counter = state.ticket_counters.entry(row.offering_id).or_insert(0);
        let first = *counter + 1;
        *counter += row.quantity;
        let tickets: Vec<Ticket> = (first..first + row.quantity)
            .map(|n| Ticket {
                id: TicketId::new(),
                offering_id: row.offering_id,
                user_id: row.user_id,
                reservation_id,
                number: TicketNumber::new(n),
                status: TicketStatus::Active,
                purchase_price: row.unit_price,
                payment_transaction_id,
                purchased_at: at,
            })
            .collect();
        state.tickets.extend(tickets.iter().cloned());

        let mut confirmed = row;
        confirmed.status = ReservationStatus::Confirmed;
        confirmed.payment_transaction_id = Some(payment_transaction_id);
        confirmed.updated_at = at;
        confirmed.processed_at = Some(at);
        state.reservations.insert(reservation_id, confirmed.clone());
        state.settle(reservation_id, PromotionUsageStatus::Resolved, at);

        Ok(ConfirmOutcome::Confirmed {
            reservation: confirmed,
            tickets,
        })
    }

    async fn tickets_for_reservation(&self, reservation_id: ReservationId) -> Result<Vec<Ticket>> {
        let state = self.guard()?;
        let mut tickets: Vec<Ticket> = state
            .tickets
            .iter()
            .filter(|t| t.reservation_id == reservation_id)
            .cloned()
            .collect();
        tickets.sort_by_key(|t| t.number);
        Ok(tickets)
    }

    async fn expired_pending(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<Reservation>> {
        let state = self.guard()?;
        let mut expired: Vec<Reservation> = state
            .reservations
            .values()
            .filter(|r| r.status == ReservationStatus::Pending && r.expires_at <= now)
            .cloned()
            .collect();
        expired.sort_by_key(|r| r.expires_at);
        expired.truncate(limit as usize);
        Ok(expired)
    }

    async fn inventory_seed(&self, offering: &Offering) -> Result<InventorySeed> {
        let state = self.guard()?;
        let mut holdings: BTreeMap<UserId, u32> = BTreeMap::new();
        for ticket in state
            .tickets
            .iter()
            .filter(|t| t.offering_id == offering.id && t.status == TicketStatus::Active)
        {
            *holdings.entry(ticket.user_id).or_default() += 1;
        }
        let holds = state
            .reservations
            .values()
            .filter(|r| r.offering_id == offering.id && r.status == ReservationStatus::Pending)
            .map(|r| HoldSeed {
                token: r.token.clone(),
                user_id: r.user_id,
                quantity: r.quantity,
            })
            .collect();

        Ok(InventorySeed {
            total: offering.total_tickets,
            sold: holdings.values().sum(),
            holds,
            holdings: holdings.into_iter().collect(),
        })
    }
}

impl PromotionStore for InMemoryStore {
    async fn get_promotion(&self, code: &str) -> Result<Option<Promotion>> {
        Ok(self.guard()?.promotions.get(code).cloned())
    }

    async fn record_usage(
        &self,
        promotion: &Promotion,
        usage: &PromotionUsage,
    ) -> Result<UsageOutcome> {
        let mut state = self.guard()?;
        let checkout = state
            .reservations
            .get(&usage.transaction_id)
            .filter(|r| r.user_id == usage.user_id);
        if !checkout.is_some_and(|r| r.is_live(usage.created_at)) {
            return Ok(UsageOutcome::CheckoutClosed(checkout.cloned()));
        }
        if let Some(existing) = state.usages.iter().find(|u| {
            u.transaction_id == usage.transaction_id
                && u.code == usage.code
                && u.status != PromotionUsageStatus::Reversed
        }) {
            return Ok(UsageOutcome::Existing(existing.clone()));
        }
        if state.active_usage_count(&usage.code, Some(usage.user_id))
            >= promotion.per_user_limit as usize
        {
            return Ok(UsageOutcome::UserLimitReached);
        }
        if promotion
            .usage_limit
            .is_some_and(|limit| state.active_usage_count(&usage.code, None) >= limit as usize)
        {
            return Ok(UsageOutcome::UsageLimitReached);
        }
        state.usages.push(usage.clone());
        Ok(UsageOutcome::Recorded(usage.clone()))
    }

    async fn settle_usages(
        &self,
        transaction_id: ReservationId,
        to: PromotionUsageStatus,
        at: DateTime<Utc>,
    ) -> Result<u64> {
        Ok(self.guard()?.settle(transaction_id, to, at))
    }

    async fn usages_for_transaction(
        &self,
        transaction_id: ReservationId,
    ) -> Result<Vec<PromotionUsage>> {
        Ok(self
            .guard()?
            .usages
            .iter()
            .filter(|u| u.transaction_id == transaction_id)
            .cloned()
            .collect())
    }
}
