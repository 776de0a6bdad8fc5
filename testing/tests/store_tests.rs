//! Tests for the in-memory durable store's claim and confirmation semantics.

#![allow(clippy::unwrap_used)] // Tests can unwrap
#![allow(clippy::expect_used)] // Tests can expect
#![allow(clippy::panic)] // Tests can panic

use chrono::Duration;
use raffle_core::{
    Claim, ClaimOutcome, ConfirmOutcome, Money, OfferingId, PaymentTransactionId, PromotionStore,
    PromotionUsage, PromotionUsageId, PromotionUsageStatus, Reservation, ReservationId,
    ReservationQuery, ReservationStatus, ReservationStore, ReservationToken, UsageOutcome, UserId,
};
use raffle_testing::{InMemoryStore, promotion, test_time};

fn pending(offering_id: OfferingId, user_id: UserId, quantity: u32) -> Reservation {
    let now = test_time();
    Reservation {
        id: ReservationId::new(),
        offering_id,
        user_id,
        quantity,
        unit_price: Money::from_cents(500),
        total_price: Money::from_cents(500 * u64::from(quantity)),
        token: ReservationToken::generate(),
        status: ReservationStatus::Pending,
        expires_at: now + Duration::minutes(5),
        created_at: now,
        updated_at: now,
        processed_at: None,
        payment_transaction_id: None,
        error_message: None,
    }
}

#[tokio::test]
async fn test_claim_has_exactly_one_winner() {
    let store = InMemoryStore::new();
    let user = UserId::new();
    let r = pending(OfferingId::new(), user, 1);
    store.insert_reservation(&r).await.unwrap();

    let at = test_time() + Duration::minutes(10);
    let cancel = store.claim(r.id, &Claim::cancel(user, at)).await.unwrap();
    let expire = store.claim(r.id, &Claim::expire(at, None)).await.unwrap();

    assert!(matches!(cancel, ClaimOutcome::Claimed(ref row) if row.status == ReservationStatus::Cancelled));
    assert!(matches!(expire, ClaimOutcome::Lost(ref row) if row.status == ReservationStatus::Cancelled));
}

#[tokio::test]
async fn test_owner_guard_hides_foreign_rows() {
    let store = InMemoryStore::new();
    let r = pending(OfferingId::new(), UserId::new(), 1);
    store.insert_reservation(&r).await.unwrap();

    let outcome = store
        .claim(r.id, &Claim::cancel(UserId::new(), test_time()))
        .await
        .unwrap();
    assert_eq!(outcome, ClaimOutcome::NotFound);
}

#[tokio::test]
async fn test_expire_guard_respects_expires_at() {
    let store = InMemoryStore::new();
    let r = pending(OfferingId::new(), UserId::new(), 1);
    store.insert_reservation(&r).await.unwrap();

    let early = store.claim(r.id, &Claim::expire(test_time(), None)).await.unwrap();
    assert!(matches!(early, ClaimOutcome::Lost(ref row) if row.status == ReservationStatus::Pending));
}

#[tokio::test]
async fn test_confirm_numbers_tickets_sequentially_per_offering() {
    let store = InMemoryStore::new();
    let offering_id = OfferingId::new();
    let a = pending(offering_id, UserId::new(), 2);
    let b = pending(offering_id, UserId::new(), 3);
    store.insert_reservation(&a).await.unwrap();
    store.insert_reservation(&b).await.unwrap();

    let at = test_time() + Duration::minutes(1);
    store.confirm(a.id, PaymentTransactionId::new(), at).await.unwrap();
    let ConfirmOutcome::Confirmed { tickets, reservation } =
        store.confirm(b.id, PaymentTransactionId::new(), at).await.unwrap()
    else {
        panic!("expected confirmation");
    };

    let numbers: Vec<u32> = tickets.iter().map(|t| t.number.value()).collect();
    assert_eq!(numbers, vec![3, 4, 5]);
    assert_eq!(reservation.status, ReservationStatus::Confirmed);
    assert_eq!(store.tickets_for_offering(offering_id).len(), 5);
}

#[tokio::test]
async fn test_confirm_after_expiry_is_lost() {
    let store = InMemoryStore::new();
    let r = pending(OfferingId::new(), UserId::new(), 1);
    store.insert_reservation(&r).await.unwrap();

    let outcome = store
        .confirm(r.id, PaymentTransactionId::new(), r.expires_at)
        .await
        .unwrap();
    assert!(matches!(outcome, ConfirmOutcome::Lost(_)));
    assert!(store.tickets_for_reservation(r.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_list_is_newest_first_and_paged() {
    let store = InMemoryStore::new();
    let user = UserId::new();
    let offering_id = OfferingId::new();
    for minutes in 0..5 {
        let mut r = pending(offering_id, user, 1);
        r.created_at = test_time() + Duration::minutes(minutes);
        store.insert_reservation(&r).await.unwrap();
    }

    let query = ReservationQuery {
        status: Some(ReservationStatus::Pending),
        page: Some(2),
        limit: Some(2),
    };
    let page = store.list_user_reservations(user, &query).await.unwrap();
    assert_eq!(page.total, 5);
    assert!(page.has_more());
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.items[0].created_at, test_time() + Duration::minutes(2));
}

#[tokio::test]
async fn test_usage_limits_count_pending_and_resolved() {
    let store = InMemoryStore::new();
    let promo = promotion("spring");
    let user = UserId::new();

    let usage = |transaction_id| PromotionUsage {
        id: PromotionUsageId::new(),
        transaction_id,
        user_id: user,
        code: promo.code.clone(),
        discount: Money::from_cents(100),
        status: PromotionUsageStatus::Pending,
        created_at: test_time(),
        settled_at: None,
    };

    let offering_id = OfferingId::new();
    let mut checkouts = Vec::new();
    for _ in 0..3 {
        let r = pending(offering_id, user, 1);
        store.insert_reservation(&r).await.unwrap();
        checkouts.push(r.id);
    }
    let [first, second, third] = checkouts[..] else {
        panic!("three checkouts");
    };

    assert!(matches!(
        store.record_usage(&promo, &usage(first)).await.unwrap(),
        UsageOutcome::Recorded(_)
    ));
    assert!(matches!(
        store.record_usage(&promo, &usage(first)).await.unwrap(),
        UsageOutcome::Existing(_)
    ));
    assert_eq!(
        store.record_usage(&promo, &usage(second)).await.unwrap(),
        UsageOutcome::UserLimitReached
    );

    store
        .settle_usages(first, PromotionUsageStatus::Reversed, test_time())
        .await
        .unwrap();
    assert!(matches!(
        store.record_usage(&promo, &usage(third)).await.unwrap(),
        UsageOutcome::Recorded(_)
    ));
}

#[tokio::test]
async fn test_usage_needs_a_live_pending_checkout() {
    let store = InMemoryStore::new();
    let promo = promotion("spring");
    let user = UserId::new();
    let usage = |transaction_id, user_id, created_at| PromotionUsage {
        id: PromotionUsageId::new(),
        transaction_id,
        user_id,
        code: promo.code.clone(),
        discount: Money::from_cents(100),
        status: PromotionUsageStatus::Pending,
        created_at,
        settled_at: None,
    };

    let cancelled = pending(OfferingId::new(), user, 1);
    store.insert_reservation(&cancelled).await.unwrap();
    store
        .claim(cancelled.id, &Claim::cancel(user, test_time()))
        .await
        .unwrap();
    match store
        .record_usage(&promo, &usage(cancelled.id, user, test_time()))
        .await
        .unwrap()
    {
        UsageOutcome::CheckoutClosed(Some(current)) => {
            assert_eq!(current.status, ReservationStatus::Cancelled);
        }
        other => panic!("expected a closed checkout, got {other:?}"),
    }

    let live = pending(OfferingId::new(), user, 1);
    store.insert_reservation(&live).await.unwrap();
    assert_eq!(
        store
            .record_usage(&promo, &usage(live.id, UserId::new(), test_time()))
            .await
            .unwrap(),
        UsageOutcome::CheckoutClosed(None)
    );
    assert_eq!(
        store
            .record_usage(&promo, &usage(ReservationId::new(), user, test_time()))
            .await
            .unwrap(),
        UsageOutcome::CheckoutClosed(None)
    );
    assert_eq!(
        store
            .record_usage(&promo, &usage(live.id, user, live.expires_at))
            .await
            .unwrap(),
        UsageOutcome::CheckoutClosed(Some(live.clone()))
    );
    assert!(store.usages_for_transaction(live.id).await.unwrap().is_empty());
}
