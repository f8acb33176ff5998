//! Reservation-engine integration tests against a live Redis.
//!
//! Run with: docker run -d -p 6379:6379 redis:7-alpine
//! then: cargo test -p rushgate-store -- --ignored

use rushgate_core::{BookingId, Error, EventId, ReserveRequest, ShowId, UserId, ZoneId};
use rushgate_store::inventory::InventoryOptions;
use rushgate_store::{scripts, RedisClient, ReservationStore};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const REDIS_URL: &str = "redis://127.0.0.1:6379";

async fn store_with_ttl(ttl_secs: i64) -> ReservationStore {
    let client = RedisClient::connect(REDIS_URL, Duration::from_secs(2))
        .await
        .expect("redis must be running for ignored tests");
    let mut conn = client.conn();
    scripts::load_all(&mut conn).await.unwrap();
    ReservationStore::new(
        &client,
        Arc::new(scripts::ScriptSet::new()),
        InventoryOptions {
            call_timeout: Duration::from_secs(2),
            max_seats_per_user: 8,
            reservation_ttl_secs: ttl_secs,
            reservation_max_ttl_secs: ttl_secs * 3,
        },
    )
}

async fn store() -> ReservationStore {
    store_with_ttl(300).await
}

fn unique_zone() -> ZoneId {
    ZoneId(format!("test-zone-{}", Uuid::new_v4()))
}

fn request(zone: &ZoneId, user: UserId, quantity: i64) -> ReserveRequest {
    ReserveRequest {
        booking_id: BookingId::generate(),
        user_id: user,
        event_id: EventId::from("test-event"),
        show_id: ShowId::from("test-show"),
        zone_id: zone.clone(),
        quantity,
        unit_price_minor: 2_500,
    }
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn hundred_concurrent_reserves_for_the_last_seat() {
    let store = store().await;
    let zone = unique_zone();
    store.set_availability(&zone, 1).await.unwrap();

    let tasks: Vec<_> = (0..100)
        .map(|_| {
            let store = store.clone();
            let request = request(&zone, UserId(Uuid::new_v4()), 1);
            tokio::spawn(async move { store.reserve(request).await })
        })
        .collect();

    let mut successes = 0;
    let mut insufficient = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => successes += 1,
            Err(Error::InsufficientStock { .. }) => insufficient += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(successes, 1, "exactly one reserve wins the last seat");
    assert_eq!(insufficient, 99);
    assert_eq!(store.availability(&zone).await.unwrap(), 0);
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn counter_never_goes_negative_under_contention() {
    let store = store().await;
    let zone = unique_zone();
    store.set_availability(&zone, 5).await.unwrap();

    let tasks: Vec<_> = (0..10)
        .map(|_| {
            let store = store.clone();
            let request = request(&zone, UserId(Uuid::new_v4()), 1);
            tokio::spawn(async move { store.reserve(request).await })
        })
        .collect();

    let mut successes = 0;
    for task in tasks {
        if task.await.unwrap().is_ok() {
            successes += 1;
        }
    }

    assert_eq!(successes, 5);
    assert_eq!(store.availability(&zone).await.unwrap(), 0);
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn release_credits_seats_exactly_once() {
    let store = store().await;
    let zone = unique_zone();
    let user = UserId(Uuid::new_v4());
    store.set_availability(&zone, 10).await.unwrap();

    let request = request(&zone, user, 3);
    let booking_id = request.booking_id;
    let event_id = request.event_id.clone();
    store.reserve(request).await.unwrap();
    assert_eq!(store.availability(&zone).await.unwrap(), 7);

    let released = store.release(booking_id, user, &event_id, &zone).await.unwrap();
    assert_eq!(released, 3);
    assert_eq!(store.availability(&zone).await.unwrap(), 10);

    let second = store.release(booking_id, user, &event_id, &zone).await;
    assert!(matches!(second, Err(Error::NotFound { .. })));
    assert_eq!(
        store.availability(&zone).await.unwrap(),
        10,
        "double release must not credit twice"
    );
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn release_by_another_user_is_refused() {
    let store = store().await;
    let zone = unique_zone();
    let owner = UserId(Uuid::new_v4());
    store.set_availability(&zone, 5).await.unwrap();

    let request = request(&zone, owner, 2);
    let booking_id = request.booking_id;
    let event_id = request.event_id.clone();
    store.reserve(request).await.unwrap();

    let thief = UserId(Uuid::new_v4());
    let result = store.release(booking_id, thief, &event_id, &zone).await;
    assert!(matches!(result, Err(Error::Conflict { .. })));
    assert_eq!(store.availability(&zone).await.unwrap(), 3);
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn confirm_after_ttl_expiry_reports_not_found_and_keeps_counter() {
    let store = store_with_ttl(2).await;
    let zone = unique_zone();
    let user = UserId(Uuid::new_v4());
    store.set_availability(&zone, 5).await.unwrap();

    let request = request(&zone, user, 2);
    let booking_id = request.booking_id;
    store.reserve(request).await.unwrap();
    assert_eq!(store.availability(&zone).await.unwrap(), 3);

    tokio::time::sleep(Duration::from_secs(3)).await;

    assert!(store.get(booking_id).await.unwrap().is_none(), "ttl evicted");
    let result = store.confirm(booking_id, user, "pay-1").await;
    assert!(matches!(result, Err(Error::NotFound { .. })));

    // Expiry never restores the counter; settlement does that via the
    // booking.expired event.
    assert_eq!(store.availability(&zone).await.unwrap(), 3);
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn confirmed_reservation_survives_and_refuses_release() {
    let store = store_with_ttl(2).await;
    let zone = unique_zone();
    let user = UserId(Uuid::new_v4());
    store.set_availability(&zone, 5).await.unwrap();

    let request = request(&zone, user, 1);
    let booking_id = request.booking_id;
    let event_id = request.event_id.clone();
    store.reserve(request).await.unwrap();
    store.confirm(booking_id, user, "pay-1").await.unwrap();

    // Confirmation removed the TTL.
    tokio::time::sleep(Duration::from_secs(3)).await;
    let reservation = store.get(booking_id).await.unwrap().unwrap();
    assert_eq!(
        reservation.status,
        rushgate_core::ReservationStatus::Confirmed
    );
    assert_eq!(reservation.payment_id.as_deref(), Some("pay-1"));

    let result = store.release(booking_id, user, &event_id, &zone).await;
    assert!(matches!(result, Err(Error::Conflict { .. })));

    let again = store.confirm(booking_id, user, "pay-2").await;
    assert!(matches!(again, Err(Error::Conflict { .. })));
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn per_user_cap_counts_seats_across_bookings() {
    let store = store().await;
    let zone = unique_zone();
    let user = UserId(Uuid::new_v4());
    store.set_availability(&zone, 100).await.unwrap();

    // Cap is 8 seats: 5 + 3 fits, one more does not.
    store.reserve(request(&zone, user, 5)).await.unwrap();
    store.reserve(request(&zone, user, 3)).await.unwrap();

    let over = store.reserve(request(&zone, user, 1)).await;
    assert!(matches!(over, Err(Error::UserLimitExceeded { limit: 8 })));
    assert_eq!(store.availability(&zone).await.unwrap(), 92);
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn duplicate_booking_id_is_a_conflict() {
    let store = store().await;
    let zone = unique_zone();
    let user = UserId(Uuid::new_v4());
    store.set_availability(&zone, 10).await.unwrap();

    let request = request(&zone, user, 1);
    store.reserve(request.clone()).await.unwrap();
    let replay = store.reserve(request).await;
    assert!(matches!(replay, Err(Error::Conflict { .. })));
    assert_eq!(store.availability(&zone).await.unwrap(), 9);
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn extend_respects_the_ceiling() {
    let store = store_with_ttl(100).await;
    let zone = unique_zone();
    let user = UserId(Uuid::new_v4());
    store.set_availability(&zone, 5).await.unwrap();

    let request = request(&zone, user, 1);
    let booking_id = request.booking_id;
    store.reserve(request).await.unwrap();

    let new_ttl = store.extend(booking_id, 100).await.unwrap();
    assert!(new_ttl > 100 && new_ttl <= 200);

    // Ceiling is ttl * 3 = 300.
    let over = store.extend(booking_id, 500).await;
    assert!(matches!(over, Err(Error::Conflict { .. })));
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn user_reservation_set_tracks_active_bookings() {
    let store = store().await;
    let zone = unique_zone();
    let user = UserId(Uuid::new_v4());
    let event = EventId::from("test-event");
    store.set_availability(&zone, 10).await.unwrap();

    let first = request(&zone, user, 2);
    let second = request(&zone, user, 1);
    let first_id = first.booking_id;
    let second_id = second.booking_id;
    store.reserve(first).await.unwrap();
    store.reserve(second).await.unwrap();

    let mut held = store.user_reservations(user, &event).await.unwrap();
    held.sort_by_key(|id| id.to_string());
    let mut expected = vec![first_id, second_id];
    expected.sort_by_key(|id| id.to_string());
    assert_eq!(held, expected);

    store.release(first_id, user, &event, &zone).await.unwrap();
    let held = store.user_reservations(user, &event).await.unwrap();
    assert_eq!(held, vec![second_id]);
}
