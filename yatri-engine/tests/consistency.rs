//! End-to-end consistency properties of the reservation core, exercised
//! against the in-memory store: mutual exclusion of claims, all-or-nothing
//! multi-seat semantics, lazy lease expiry, idempotent release and
//! confirmation, ledger consistency and the checkout timeout.

use std::sync::Arc;

use chrono::Duration;
use tokio::sync::Barrier;

use yatri_domain::{
    BookingStatus, BookingStore, ChangeOp, ChangePayload, ClaimOutcome, CoinLedger, EngineError,
    LeaseStore, NewBooking, PendingOutcome, SeatStatus,
};
use yatri_engine::{BookingService, ChangeFeed, CoinService, ExpiryReaper, SeatLockManager};
use yatri_store::app_config::BusinessRules;
use yatri_store::MemoryStore;

const BUS: i64 = 10;
const FARE: i64 = 50_000;

struct Harness {
    store: Arc<MemoryStore>,
    locks: Arc<SeatLockManager>,
    bookings: Arc<BookingService>,
    coins: CoinService,
    reaper: ExpiryReaper,
    feed: ChangeFeed,
}

fn harness(rules: BusinessRules) -> Harness {
    let store = Arc::new(MemoryStore::new());
    store.put_bus(BUS, FARE);

    let leases: Arc<dyn LeaseStore> = store.clone();
    let booking_store: Arc<dyn BookingStore> = store.clone();
    let ledger: Arc<dyn CoinLedger> = store.clone();

    let feed = ChangeFeed::new(256);
    let locks = Arc::new(SeatLockManager::new(
        leases.clone(),
        booking_store.clone(),
        feed.clone(),
        rules.clone(),
    ));
    let bookings = Arc::new(BookingService::new(
        booking_store.clone(),
        feed.clone(),
        rules.clone(),
    ));
    let coins = CoinService::new(ledger);
    let reaper = ExpiryReaper::new(leases, booking_store, feed.clone(), rules);

    Harness {
        store,
        locks,
        bookings,
        coins,
        reaper,
        feed,
    }
}

fn seats(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn details() -> serde_json::Value {
    serde_json::json!([{ "name": "Asha Verma", "age": 29 }])
}

fn contact() -> serde_json::Value {
    serde_json::json!({ "email": "asha@example.com", "phone": "+919800000000" })
}

#[tokio::test]
async fn concurrent_claims_for_one_seat_have_exactly_one_winner() {
    let h = harness(BusinessRules::default());
    let barrier = Arc::new(Barrier::new(8));

    let mut tasks = Vec::new();
    for i in 0..8 {
        let locks = h.locks.clone();
        let barrier = barrier.clone();
        tasks.push(tokio::spawn(async move {
            barrier.wait().await;
            locks
                .claim(BUS, &seats(&["L5"]), &format!("holder-{i}"), None)
                .await
                .unwrap()
        }));
    }

    let mut winners = 0;
    for task in tasks {
        match task.await.unwrap() {
            ClaimOutcome::Granted(_) => winners += 1,
            ClaimOutcome::Conflict(conflicts) => {
                assert_eq!(conflicts, seats(&["L5"]));
            }
        }
    }
    assert_eq!(winners, 1);
}

#[tokio::test]
async fn overlapping_claim_conflicts_only_on_contested_seats() {
    let h = harness(BusinessRules::default());

    let first = h
        .locks
        .claim(BUS, &seats(&["L1", "L2"]), "holder-a", None)
        .await
        .unwrap();
    assert!(matches!(first, ClaimOutcome::Granted(_)));

    let second = h
        .locks
        .claim(BUS, &seats(&["L2", "L3"]), "holder-b", None)
        .await
        .unwrap();
    match second {
        ClaimOutcome::Conflict(conflicts) => assert_eq!(conflicts, seats(&["L2"])),
        other => panic!("expected conflict, got {:?}", other),
    }

    // All-or-nothing: the loser holds nothing, not even the free seat.
    let map = h.locks.seat_status_map(BUS, "holder-b").await.unwrap();
    assert_eq!(map.get("L1"), Some(&SeatStatus::LeasedByOther));
    assert_eq!(map.get("L2"), Some(&SeatStatus::LeasedByOther));
    assert_eq!(map.get("L3"), None);
}

#[tokio::test]
async fn expired_lease_is_claimable_without_the_reaper() {
    let h = harness(BusinessRules::default());
    let short = Duration::milliseconds(50);

    let first = h
        .locks
        .claim(BUS, &seats(&["L2", "L3"]), "holder-a", Some(short))
        .await
        .unwrap();
    assert!(matches!(first, ClaimOutcome::Granted(_)));

    tokio::time::sleep(std::time::Duration::from_millis(80)).await;

    // The stale rows are still in the store; reads must not trust them.
    assert_eq!(
        h.locks.seat_status(BUS, "L2", "holder-b").await.unwrap(),
        SeatStatus::Available
    );

    let retry = h
        .locks
        .claim(BUS, &seats(&["L2", "L3"]), "holder-b", None)
        .await
        .unwrap();
    assert!(matches!(retry, ClaimOutcome::Granted(_)));
}

#[tokio::test]
async fn renewing_own_claim_refreshes_expiry() {
    let h = harness(BusinessRules::default());

    let first = match h
        .locks
        .claim(BUS, &seats(&["L7"]), "holder-a", None)
        .await
        .unwrap()
    {
        ClaimOutcome::Granted(leases) => leases[0].expires_at,
        other => panic!("expected grant, got {:?}", other),
    };

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    match h
        .locks
        .claim(BUS, &seats(&["L7"]), "holder-a", None)
        .await
        .unwrap()
    {
        ClaimOutcome::Granted(leases) => assert!(leases[0].expires_at > first),
        other => panic!("renewal should succeed, got {:?}", other),
    }
}

#[tokio::test]
async fn claim_validation_rejects_empty_and_oversized_sets() {
    let h = harness(BusinessRules::default());

    let empty = h.locks.claim(BUS, &[], "holder-a", None).await;
    assert!(matches!(empty, Err(EngineError::InvalidClaim(_))));

    let hoard = h
        .locks
        .claim(BUS, &seats(&["L1", "L2", "L3", "L4", "L5"]), "holder-a", None)
        .await;
    assert!(matches!(hoard, Err(EngineError::InvalidClaim(_))));
}

#[tokio::test]
async fn release_is_idempotent() {
    let h = harness(BusinessRules::default());
    h.locks
        .claim(BUS, &seats(&["L1", "L2"]), "holder-a", None)
        .await
        .unwrap();

    h.locks.release(BUS, "holder-a").await.unwrap();
    let after_first = h.locks.seat_status_map(BUS, "holder-a").await.unwrap();
    assert!(after_first.is_empty());

    // Second release of the same holder is a no-op, not an error.
    h.locks.release(BUS, "holder-a").await.unwrap();
    let after_second = h.locks.seat_status_map(BUS, "holder-a").await.unwrap();
    assert_eq!(after_first, after_second);
}

#[tokio::test]
async fn confirmation_is_idempotent_and_credits_once() {
    let h = harness(BusinessRules::default());
    h.locks
        .claim(BUS, &seats(&["L1", "L2"]), "user-1", None)
        .await
        .unwrap();

    let booking = h
        .bookings
        .create_pending(BUS, &seats(&["L1", "L2"]), "user-1", details(), contact())
        .await
        .unwrap();
    assert_eq!(booking.status, BookingStatus::Pending);
    // 2 x fare + 5% fee
    assert_eq!(booking.total_amount, 105_000);

    let first = h.bookings.confirm(booking.id, "pay_123").await.unwrap();
    assert_eq!(first.status, BookingStatus::Confirmed);
    assert_eq!(first.coins_earned, 50);

    let second = h.bookings.confirm(booking.id, "pay_123").await.unwrap();
    assert_eq!(second.status, BookingStatus::Confirmed);

    assert_eq!(h.coins.balance("user-1").await.unwrap(), 50);
    assert!(h.coins.reconcile("user-1").await.unwrap());

    // Confirmation released the winner's leases; the seats stay taken
    // through the booking itself.
    assert_eq!(
        h.locks.seat_status(BUS, "L1", "user-1").await.unwrap(),
        SeatStatus::Booked
    );
}

#[tokio::test]
async fn concurrent_duplicate_confirmations_credit_once() {
    let h = harness(BusinessRules::default());
    h.locks
        .claim(BUS, &seats(&["L4"]), "user-1", None)
        .await
        .unwrap();
    let booking = h
        .bookings
        .create_pending(BUS, &seats(&["L4"]), "user-1", details(), contact())
        .await
        .unwrap();

    let barrier = Arc::new(Barrier::new(4));
    let mut tasks = Vec::new();
    for _ in 0..4 {
        let bookings = h.bookings.clone();
        let barrier = barrier.clone();
        let id = booking.id;
        tasks.push(tokio::spawn(async move {
            barrier.wait().await;
            bookings.confirm(id, "pay_dup").await
        }));
    }
    for task in tasks {
        let confirmed = task.await.unwrap().unwrap();
        assert_eq!(confirmed.status, BookingStatus::Confirmed);
    }

    assert_eq!(h.coins.balance("user-1").await.unwrap(), 50);
    assert!(h.coins.reconcile("user-1").await.unwrap());
}

#[tokio::test]
async fn no_seat_belongs_to_two_live_bookings() {
    let h = harness(BusinessRules::default());
    h.locks
        .claim(BUS, &seats(&["L1", "L2"]), "user-1", None)
        .await
        .unwrap();
    h.bookings
        .create_pending(BUS, &seats(&["L1", "L2"]), "user-1", details(), contact())
        .await
        .unwrap();

    // A fresh claim observes the pending booking even though user-1 still
    // holds the leases.
    let claim = h
        .locks
        .claim(BUS, &seats(&["L2", "L3"]), "user-2", None)
        .await
        .unwrap();
    match claim {
        ClaimOutcome::Conflict(conflicts) => assert_eq!(conflicts, seats(&["L2"])),
        other => panic!("expected conflict, got {:?}", other),
    }

    // Even writing straight at the store, an overlapping pending booking is
    // rejected atomically.
    let outcome = h
        .store
        .insert_pending(&NewBooking {
            user_id: "user-2".to_string(),
            bus_id: BUS,
            selected_seats: seats(&["L2"]),
            passenger_details: details(),
            contact_info: contact(),
            total_amount: 52_500,
            coins_used: 0,
        })
        .await
        .unwrap();
    assert!(matches!(outcome, PendingOutcome::SeatsTaken(s) if s == seats(&["L2"])));
}

#[tokio::test]
async fn duplicate_seats_in_a_booking_request_charge_once() {
    let h = harness(BusinessRules::default());
    h.locks
        .claim(BUS, &seats(&["L1"]), "user-1", None)
        .await
        .unwrap();

    let booking = h
        .bookings
        .create_pending(BUS, &seats(&["L1", "L1"]), "user-1", details(), contact())
        .await
        .unwrap();

    assert_eq!(booking.selected_seats, seats(&["L1"]));
    // 1 x fare + 5% fee, not twice that
    assert_eq!(booking.total_amount, 52_500);
}

#[tokio::test]
async fn booking_request_honors_the_per_claim_seat_cap() {
    let h = harness(BusinessRules::default());

    let err = h
        .bookings
        .create_pending(
            BUS,
            &seats(&["L1", "L2", "L3", "L4", "L5"]),
            "user-1",
            details(),
            contact(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidClaim(_)));
}

#[tokio::test]
async fn pending_booking_requires_live_leases() {
    let h = harness(BusinessRules::default());

    let err = h
        .bookings
        .create_pending(BUS, &seats(&["L9"]), "user-1", details(), contact())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::LeaseExpired { seats: s } if s == seats(&["L9"])));
}

#[tokio::test]
async fn checkout_timeout_cancels_pending_and_frees_seats() {
    let rules = BusinessRules {
        pending_timeout_seconds: 0,
        ..BusinessRules::default()
    };
    let h = harness(rules);

    h.locks
        .claim(BUS, &seats(&["L1"]), "user-1", None)
        .await
        .unwrap();
    let booking = h
        .bookings
        .create_pending(BUS, &seats(&["L1"]), "user-1", details(), contact())
        .await
        .unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    h.reaper.sweep_once().await;

    let after = h.bookings.get(booking.id).await.unwrap();
    assert_eq!(after.status, BookingStatus::Cancelled);

    let claim = h
        .locks
        .claim(BUS, &seats(&["L1"]), "user-2", None)
        .await
        .unwrap();
    assert!(matches!(claim, ClaimOutcome::Granted(_)));
}

#[tokio::test]
async fn cancel_frees_seats_and_is_not_repeatable() {
    let h = harness(BusinessRules::default());
    h.locks
        .claim(BUS, &seats(&["L6"]), "user-1", None)
        .await
        .unwrap();
    let booking = h
        .bookings
        .create_pending(BUS, &seats(&["L6"]), "user-1", details(), contact())
        .await
        .unwrap();

    h.bookings.cancel(booking.id).await.unwrap();
    assert_eq!(
        h.locks.seat_status(BUS, "L6", "user-2").await.unwrap(),
        SeatStatus::Available
    );

    let err = h.bookings.cancel(booking.id).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::InvalidTransition {
            from: BookingStatus::Cancelled,
            to: BookingStatus::Cancelled,
        }
    ));
}

#[tokio::test]
async fn refund_is_terminal_and_claws_back_the_reward() {
    let h = harness(BusinessRules::default());
    h.locks
        .claim(BUS, &seats(&["L8"]), "user-1", None)
        .await
        .unwrap();
    let booking = h
        .bookings
        .create_pending(BUS, &seats(&["L8"]), "user-1", details(), contact())
        .await
        .unwrap();

    // Refund before confirmation is not a legal move.
    let early = h.bookings.refund(booking.id).await.unwrap_err();
    assert!(matches!(early, EngineError::InvalidTransition { .. }));

    h.bookings.confirm(booking.id, "pay_1").await.unwrap();
    let refunded = h.bookings.refund(booking.id).await.unwrap();
    assert_eq!(refunded.status, BookingStatus::Refunded);

    assert_eq!(h.coins.balance("user-1").await.unwrap(), 0);
    assert!(h.coins.reconcile("user-1").await.unwrap());

    let again = h.bookings.refund(booking.id).await.unwrap_err();
    assert!(matches!(again, EngineError::InvalidTransition { .. }));
}

#[tokio::test]
async fn ledger_balance_matches_entry_sum_under_concurrent_writers() {
    let h = harness(BusinessRules::default());
    let coins = Arc::new(h.coins);
    let barrier = Arc::new(Barrier::new(30));

    let mut tasks = Vec::new();
    for i in 0..30 {
        let coins = coins.clone();
        let barrier = barrier.clone();
        tasks.push(tokio::spawn(async move {
            barrier.wait().await;
            if i % 3 == 0 {
                // Debits may be rejected while the balance is still low;
                // rejections must not write anything.
                let _ = coins.debit("user-1", 5, None, "coin discount").await;
            } else {
                coins.credit("user-1", 10, None, "booking reward").await.unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let balance = coins.balance("user-1").await.unwrap();
    let sum: i64 = coins
        .entries("user-1")
        .await
        .unwrap()
        .iter()
        .map(|e| e.amount)
        .sum();
    assert_eq!(balance, sum);
    assert!(coins.reconcile("user-1").await.unwrap());
}

#[tokio::test]
async fn debit_beyond_balance_is_rejected() {
    let h = harness(BusinessRules::default());
    h.coins.credit("user-1", 20, None, "signup bonus").await.unwrap();

    let err = h
        .coins
        .debit("user-1", 100, None, "coin discount")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::InsufficientBalance {
            balance: 20,
            requested: 100,
        }
    ));
    assert_eq!(h.coins.balance("user-1").await.unwrap(), 20);
}

#[tokio::test]
async fn feed_carries_lease_and_booking_mutations() {
    let h = harness(BusinessRules::default());
    let mut rx = h.feed.subscribe();

    h.locks
        .claim(BUS, &seats(&["L1"]), "user-1", None)
        .await
        .unwrap();

    let event = rx.recv().await.unwrap();
    assert_eq!(event.bus_id, BUS);
    assert_eq!(event.op, ChangeOp::Inserted);
    match event.payload {
        ChangePayload::Lease(lease) => {
            assert_eq!(lease.seat_number, "L1");
            assert_eq!(lease.holder_id, "user-1");
        }
        other => panic!("expected a lease event, got {:?}", other),
    }

    let booking = h
        .bookings
        .create_pending(BUS, &seats(&["L1"]), "user-1", details(), contact())
        .await
        .unwrap();
    let event = rx.recv().await.unwrap();
    match event.payload {
        ChangePayload::Booking(summary) => {
            assert_eq!(summary.id, booking.id);
            assert_eq!(summary.status, BookingStatus::Pending);
        }
        other => panic!("expected a booking event, got {:?}", other),
    }
}
