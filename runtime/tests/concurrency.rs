//! Concurrency tests: over-subscription, duplicate payment signals and
//! competing reapers, run on a multi-threaded runtime.

#![allow(clippy::unwrap_used)] // Tests can unwrap
#![allow(clippy::expect_used)] // Tests can expect
#![allow(clippy::panic)] // Tests can panic

use chrono::Duration;
use futures::future::join_all;
use raffle_core::{
    InventoryLedger, OfferingId, PaymentTransactionId, ReservationError, ReservationStatus,
    UserId,
};
use raffle_runtime::{
    ExpiryReaper, PurchaseCompletion, PurchaseOutcome, ReaperConfig, ReservationEnvironment,
    ReservationManager, ReservationSettings,
};
use raffle_testing::{InMemoryLedger, InMemoryStore, ManualClock, OfferingBuilder, manual_clock, test_time};
use std::sync::Arc;

struct Shop {
    clock: Arc<ManualClock>,
    ledger: Arc<InMemoryLedger>,
    store: InMemoryStore,
    env: ReservationEnvironment<InMemoryLedger, InMemoryStore>,
    reservations: ReservationManager<InMemoryLedger, InMemoryStore>,
}

fn shop() -> Shop {
    let clock = Arc::new(manual_clock());
    let ledger = Arc::new(InMemoryLedger::new());
    let store = InMemoryStore::new();
    let env = ReservationEnvironment::new(Arc::clone(&ledger), Arc::new(store.clone()))
        .with_clock(clock.clone());
    Shop {
        reservations: ReservationManager::new(env.clone(), ReservationSettings::default()),
        clock,
        ledger,
        store,
        env,
    }
}

fn offering(shop: &Shop, total: u32) -> OfferingId {
    let offering = OfferingBuilder::new(test_time()).total_tickets(total).build();
    let id = offering.id;
    shop.store.put_offering(offering);
    id
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_oversubscription_yields_exactly_the_available_count() {
    let shop = shop();
    let offering_id = offering(&shop, 10);

    let handles: Vec<_> = (0..40)
        .map(|_| {
            let reservations = shop.reservations.clone();
            tokio::spawn(async move { reservations.create(offering_id, UserId::new(), 1).await })
        })
        .collect();

    let mut reserved = 0;
    let mut sold_out = 0;
    for result in join_all(handles).await {
        match result.unwrap() {
            Ok(_) => reserved += 1,
            Err(ReservationError::InsufficientInventory { .. }) => sold_out += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(reserved, 10);
    assert_eq!(sold_out, 30);
    let snap = shop.ledger.status(offering_id).await.unwrap().unwrap();
    assert_eq!((snap.available, snap.reserved), (0, 10));
    assert_eq!(shop.store.committed_quantity(offering_id), 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_mixed_quantities_never_oversell() {
    let shop = shop();
    let offering_id = offering(&shop, 25);

    let handles: Vec<_> = (0..30_u32)
        .map(|i| {
            let reservations = shop.reservations.clone();
            tokio::spawn(async move { reservations.create(offering_id, UserId::new(), i % 4 + 1).await })
        })
        .collect();

    let granted: u32 = join_all(handles)
        .await
        .into_iter()
        .filter_map(|r| r.unwrap().ok())
        .map(|r| r.quantity)
        .sum();

    let snap = shop.ledger.status(offering_id).await.unwrap().unwrap();
    assert!(granted <= 25);
    assert_eq!(snap.reserved, granted);
    assert_eq!(snap.available + snap.reserved, 25);
    assert_eq!(shop.store.committed_quantity(offering_id), granted);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_duplicate_payment_signals_confirm_once() {
    let shop = shop();
    let offering_id = offering(&shop, 10);
    let r = shop
        .reservations
        .create(offering_id, UserId::new(), 3)
        .await
        .unwrap();
    let purchases = PurchaseCompletion::new(shop.env.clone());
    let payment = PaymentTransactionId::new();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let purchases = purchases.clone();
            tokio::spawn(async move { purchases.on_payment_succeeded(r.id, payment).await })
        })
        .collect();
    let outcomes: Vec<PurchaseOutcome> = join_all(handles)
        .await
        .into_iter()
        .map(|h| h.unwrap().unwrap())
        .collect();

    let confirmed = outcomes
        .iter()
        .filter(|o| matches!(o, PurchaseOutcome::Confirmed { .. }))
        .count();
    assert_eq!(confirmed, 1);
    assert!(outcomes.iter().all(|o| o.tickets().len() == 3));
    assert_eq!(shop.store.tickets_for_offering(offering_id).len(), 3);

    let snap = shop.ledger.status(offering_id).await.unwrap().unwrap();
    assert_eq!((snap.available, snap.reserved), (7, 0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_competing_reapers_release_exactly_once() {
    let shop = shop();
    let offering_id = offering(&shop, 50);
    let mut created = Vec::new();
    for _ in 0..20 {
        created.push(
            shop.reservations
                .create(offering_id, UserId::new(), 2)
                .await
                .unwrap(),
        );
    }
    shop.clock.advance(Duration::minutes(6));

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let reaper = ExpiryReaper::new(
                shop.env.clone(),
                ReaperConfig {
                    batch_size: 5,
                    ..ReaperConfig::default()
                },
            );
            tokio::spawn(async move { reaper.run_once().await })
        })
        .collect();
    let expired: u64 = join_all(handles)
        .await
        .into_iter()
        .map(|h| h.unwrap().unwrap().expired)
        .sum();

    assert_eq!(expired, 20);
    let snap = shop.ledger.status(offering_id).await.unwrap().unwrap();
    assert_eq!((snap.available, snap.reserved), (50, 0));
    assert_eq!(shop.ledger.hold_count(offering_id), 0);
    for r in created {
        let current = shop.reservations.get(r.id, r.user_id).await.unwrap();
        assert_eq!(current.status, ReservationStatus::Expired);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancel_races_payment_with_one_winner() {
    let shop = shop();
    let offering_id = offering(&shop, 10);
    let purchases = PurchaseCompletion::new(shop.env.clone());

    for _ in 0..10 {
        let user = UserId::new();
        let r = shop.reservations.create(offering_id, user, 1).await.unwrap();

        let cancel = {
            let reservations = shop.reservations.clone();
            tokio::spawn(async move { reservations.cancel(r.id, user).await })
        };
        let pay = {
            let purchases = purchases.clone();
            tokio::spawn(async move {
                purchases
                    .on_payment_succeeded(r.id, PaymentTransactionId::new())
                    .await
            })
        };
        let cancelled = cancel.await.unwrap();
        let paid = pay.await.unwrap().unwrap();

        match paid {
            PurchaseOutcome::Confirmed { .. } => {
                assert!(matches!(cancelled, Err(ReservationError::ReservationNotPending { .. })));
            }
            PurchaseOutcome::Declined(ref current) => {
                assert_eq!(current.status, ReservationStatus::Cancelled);
                assert!(cancelled.unwrap());
            }
            PurchaseOutcome::AlreadyConfirmed { .. } => panic!("only one payment signal was sent"),
        }
    }

    let snap = shop.ledger.status(offering_id).await.unwrap().unwrap();
    let sold = u32::try_from(shop.store.tickets_for_offering(offering_id).len()).unwrap();
    assert_eq!(snap.reserved, 0);
    assert_eq!(snap.available + sold, 10);
}
