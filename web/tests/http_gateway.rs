//! Gateway integration tests: mock reservation engine and booking store
//! behind the provider traits, live Redis for the admission stores.
//!
//! Run with: docker run -d -p 6379:6379 redis:7-alpine
//! then: cargo test -p rushgate-web -- --ignored

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration as ChronoDuration, Utc};
use rushgate_core::config::AdmissionConfig;
use rushgate_core::providers::{BookingStore, ReservationEngine, ZoneInfo};
use rushgate_core::{
    Booking, BookingEvent, BookingId, Error, EventId, Reservation, ReservationStatus,
    ReserveOutcome, ReserveRequest, Result, ShowId, UserId, ZoneId,
};
use rushgate_store::{scripts, IdempotencyStore, QueuePassStore, RedisClient, VirtualQueue};
use rushgate_web::{build_router, AppState};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;

const REDIS_URL: &str = "redis://127.0.0.1:6379";

struct MockEngine {
    available: AtomicI64,
    reserve_calls: AtomicUsize,
    reservations: Mutex<HashMap<BookingId, Reservation>>,
}

impl MockEngine {
    fn with_seats(seats: i64) -> Self {
        Self {
            available: AtomicI64::new(seats),
            reserve_calls: AtomicUsize::new(0),
            reservations: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl ReservationEngine for MockEngine {
    async fn reserve(&self, request: ReserveRequest) -> Result<ReserveOutcome> {
        self.reserve_calls.fetch_add(1, Ordering::SeqCst);
        let available = self.available.load(Ordering::SeqCst);
        if available < request.quantity {
            return Err(Error::InsufficientStock { available });
        }
        let remaining = self.available.fetch_sub(request.quantity, Ordering::SeqCst)
            - request.quantity;
        let reservation = Reservation::new(
            request.booking_id,
            request.user_id,
            request.event_id,
            request.show_id,
            request.zone_id,
            request.quantity,
            request.unit_price_minor,
            ChronoDuration::seconds(300),
            Utc::now(),
        );
        self.reservations
            .lock()
            .unwrap()
            .insert(request.booking_id, reservation.clone());
        Ok(ReserveOutcome {
            reservation,
            remaining,
        })
    }

    async fn release(
        &self,
        booking_id: BookingId,
        _user_id: UserId,
        _event_id: &EventId,
        _zone_id: &ZoneId,
    ) -> Result<i64> {
        let mut reservations = self.reservations.lock().unwrap();
        match reservations.get(&booking_id) {
            None => Err(Error::NotFound { resource: "reservation" }),
            Some(r) if r.status == ReservationStatus::Confirmed => Err(Error::Conflict {
                message: "reservation already confirmed".into(),
            }),
            Some(r) => {
                let quantity = r.quantity;
                reservations.remove(&booking_id);
                Ok(quantity)
            }
        }
    }

    async fn confirm(
        &self,
        booking_id: BookingId,
        _user_id: UserId,
        payment_id: &str,
    ) -> Result<()> {
        let mut reservations = self.reservations.lock().unwrap();
        match reservations.get_mut(&booking_id) {
            None => Err(Error::NotFound { resource: "reservation" }),
            Some(r) if r.status == ReservationStatus::Confirmed => Err(Error::Conflict {
                message: "reservation already confirmed".into(),
            }),
            Some(r) => {
                r.status = ReservationStatus::Confirmed;
                r.payment_id = Some(payment_id.to_string());
                Ok(())
            }
        }
    }

    async fn extend(&self, _booking_id: BookingId, _additional_secs: i64) -> Result<i64> {
        Ok(300)
    }

    async fn get(&self, booking_id: BookingId) -> Result<Option<Reservation>> {
        Ok(self.reservations.lock().unwrap().get(&booking_id).cloned())
    }

    async fn availability(&self, _zone_id: &ZoneId) -> Result<i64> {
        Ok(self.available.load(Ordering::SeqCst))
    }

    async fn set_availability(&self, _zone_id: &ZoneId, seats: i64) -> Result<()> {
        self.available.store(seats, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct MockBookings {
    rows: Mutex<HashMap<BookingId, Booking>>,
}

#[async_trait]
impl BookingStore for MockBookings {
    async fn create_reserved(
        &self,
        booking: &Booking,
        _request_hash: &str,
        _event: &BookingEvent,
    ) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        if rows.values().any(|b| b.idempotency_key == booking.idempotency_key) {
            return Err(Error::Conflict {
                message: "insert booking: duplicate key".into(),
            });
        }
        rows.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn apply_transition(&self, booking: &Booking, _event: &BookingEvent) -> Result<()> {
        self.rows.lock().unwrap().insert(booking.id, booking.clone());
        Ok(())
    }

    async fn get(&self, id: BookingId) -> Result<Option<Booking>> {
        Ok(self.rows.lock().unwrap().get(&id).cloned())
    }

    async fn get_by_idempotency_key(&self, key: &str) -> Result<Option<Booking>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .find(|b| b.idempotency_key == key)
            .cloned())
    }

    async fn list_for_user(&self, user_id: UserId, _limit: i64) -> Result<Vec<Booking>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn zone_info(&self, zone_id: &ZoneId, _show_id: &ShowId) -> Result<Option<ZoneInfo>> {
        if zone_id.as_str() == "missing-zone" {
            return Ok(None);
        }
        Ok(Some(ZoneInfo {
            event_id: EventId::from("ev-1"),
            unit_price_minor: 2_500,
            total_seats: 100,
        }))
    }
}

struct Harness {
    state: AppState,
    engine: Arc<MockEngine>,
}

async fn harness(seats: i64) -> Harness {
    let client = RedisClient::connect(REDIS_URL, Duration::from_secs(2))
        .await
        .expect("redis must be running for ignored tests");
    let mut conn = client.conn();
    scripts::load_all(&mut conn).await.unwrap();
    let script_set = Arc::new(scripts::ScriptSet::new());

    let engine = Arc::new(MockEngine::with_seats(seats));
    let admission = AdmissionConfig {
        default_rate_per_sec: 1_000.0,
        default_burst: 1_000.0,
        queue_pass_secret: "test-pass-secret".into(),
        queue_pass_ttl_secs: 300,
        queue_pass_check_store: true,
        reservation_ttl_secs: 300,
        reservation_max_ttl_secs: 900,
        max_seats_per_user: 8,
        idempotency_ttl_secs: 60,
        idempotency_max_body_bytes: 65_536,
        fingerprint_key: "test-fingerprint-key".into(),
        queue_idle_timeout_secs: 120,
    };

    let state = AppState::new(
        Arc::clone(&engine) as Arc<dyn ReservationEngine>,
        Arc::new(MockBookings::default()),
        VirtualQueue::new(&client, Arc::clone(&script_set), Duration::from_secs(2)),
        QueuePassStore::new(&client, Duration::from_secs(2)),
        IdempotencyStore::new(&client, Duration::from_secs(2), 60),
        None,
        admission,
        1_000,
    );
    Harness { state, engine }
}

fn booking_request(user: Uuid, idempotency_key: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/v1/bookings")
        .header("content-type", "application/json")
        .header("x-user-id", user.to_string())
        .header("idempotency-key", idempotency_key)
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn booking_body() -> String {
    r#"{"event_id":"ev-1","show_id":"show-1","zone_id":"zone-a","quantity":2}"#.to_string()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), 1_000_000)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn unique_key() -> String {
    format!("test-idempotency-{}", Uuid::new_v4())
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn booking_happy_path_returns_201_with_rate_headers() {
    let harness = harness(100).await;
    let router = build_router(harness.state);

    let response = router
        .oneshot(booking_request(Uuid::new_v4(), &unique_key(), &booking_body()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert!(response.headers().contains_key("x-ratelimit-limit"));
    assert!(response.headers().contains_key("x-ratelimit-remaining"));
    assert!(response.headers().contains_key("x-ratelimit-reset"));

    let body = body_string(response).await;
    assert!(body.contains("\"success\":true"));
    assert!(body.contains("\"status\":\"reserved\""));
    assert!(body.contains("\"total_price\":5000"));
    assert!(body.contains("\"expires_in_secs\""));
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn confirm_transitions_the_booking_and_stamps_a_code() {
    let harness = harness(100).await;
    let router = build_router(harness.state);
    let user = Uuid::new_v4();

    let created = router
        .clone()
        .oneshot(booking_request(user, &unique_key(), &booking_body()))
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);
    let created: serde_json::Value =
        serde_json::from_str(&body_string(created).await).unwrap();
    let booking_id = created["data"]["booking_id"].as_str().unwrap().to_string();

    let confirm = Request::builder()
        .method("POST")
        .uri(format!("/api/v1/bookings/{booking_id}/confirm"))
        .header("content-type", "application/json")
        .header("x-user-id", user.to_string())
        .header("idempotency-key", unique_key())
        .body(Body::from(r#"{"payment_id":"pay-1"}"#))
        .unwrap();
    let response = router.clone().oneshot(confirm).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_string(response).await;
    assert!(body.contains("\"status\":\"confirmed\""));
    assert!(body.contains("CONF-"));

    // The hold is settled now; a cancel is refused as a conflict.
    let cancel = Request::builder()
        .method("POST")
        .uri(format!("/api/v1/bookings/{booking_id}/cancel"))
        .header("x-user-id", user.to_string())
        .header("idempotency-key", unique_key())
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(cancel).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn another_users_booking_is_invisible_to_confirm() {
    let harness = harness(100).await;
    let router = build_router(harness.state);
    let owner = Uuid::new_v4();

    let created = router
        .clone()
        .oneshot(booking_request(owner, &unique_key(), &booking_body()))
        .await
        .unwrap();
    let created: serde_json::Value =
        serde_json::from_str(&body_string(created).await).unwrap();
    let booking_id = created["data"]["booking_id"].as_str().unwrap().to_string();

    let confirm = Request::builder()
        .method("POST")
        .uri(format!("/api/v1/bookings/{booking_id}/confirm"))
        .header("content-type", "application/json")
        .header("x-user-id", Uuid::new_v4().to_string())
        .header("idempotency-key", unique_key())
        .body(Body::from(r#"{"payment_id":"pay-1"}"#))
        .unwrap();
    let response = router.oneshot(confirm).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn idempotent_retry_replays_bytes_and_runs_handler_once() {
    let harness = harness(100).await;
    let router = build_router(harness.state.clone());
    let user = Uuid::new_v4();
    let key = unique_key();

    let first = router
        .clone()
        .oneshot(booking_request(user, &key, &booking_body()))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);
    let first_body = body_string(first).await;

    let second = router
        .oneshot(booking_request(user, &key, &booking_body()))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CREATED);
    assert_eq!(
        second.headers().get("x-idempotency-replayed").unwrap(),
        "true"
    );
    let second_body = body_string(second).await;

    assert_eq!(first_body, second_body, "replay must be byte-identical");
    assert_eq!(
        harness.engine.reserve_calls.load(Ordering::SeqCst),
        1,
        "handler must run exactly once"
    );
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn same_key_different_body_is_key_reuse() {
    let harness = harness(100).await;
    let router = build_router(harness.state);
    let user = Uuid::new_v4();
    let key = unique_key();

    let first = router
        .clone()
        .oneshot(booking_request(user, &key, &booking_body()))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);

    let different =
        r#"{"event_id":"ev-1","show_id":"show-1","zone_id":"zone-a","quantity":4}"#;
    let second = router
        .oneshot(booking_request(user, &key, different))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_string(second).await;
    assert!(body.contains("CONFLICT"));
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn missing_idempotency_key_is_rejected() {
    let harness = harness(100).await;
    let router = build_router(harness.state);

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/bookings")
        .header("content-type", "application/json")
        .header("x-user-id", Uuid::new_v4().to_string())
        .body(Body::from(booking_body()))
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn insufficient_stock_maps_to_422() {
    let harness = harness(1).await;
    let router = build_router(harness.state);

    let response = router
        .oneshot(booking_request(Uuid::new_v4(), &unique_key(), &booking_body()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_string(response).await;
    assert!(body.contains("INSUFFICIENT_STOCK"));
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn unknown_zone_is_404() {
    let harness = harness(100).await;
    let router = build_router(harness.state);

    let body = r#"{"event_id":"ev-1","show_id":"show-1","zone_id":"missing-zone","quantity":1}"#;
    let response = router
        .oneshot(booking_request(Uuid::new_v4(), &unique_key(), body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn queue_mode_gates_bookings_without_a_pass() {
    let harness = harness(100).await;
    harness.state.queue_mode.set_enabled(true);
    let router = build_router(harness.state);

    let response = router
        .oneshot(booking_request(Uuid::new_v4(), &unique_key(), &booking_body()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_string(response).await;
    assert!(body.contains("QUEUE_REQUIRED"));
    assert!(body.contains("missing queue pass"));
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn valid_pass_passes_the_gate_and_bypasses_rate_limiting() {
    let harness = harness(100).await;
    harness.state.queue_mode.set_enabled(true);
    let user = Uuid::new_v4();
    let event = EventId::from("ev-1");

    // Issue the pass the way the release worker does: sign it and mirror
    // it into the store.
    let (token, _expires_at) = harness
        .state
        .pass_issuer
        .issue(UserId(user), &event)
        .unwrap();
    harness
        .state
        .passes
        .store(&event, UserId(user), &token, Duration::from_secs(300))
        .await
        .unwrap();

    let router = build_router(harness.state);
    let mut request = booking_request(user, &unique_key(), &booking_body());
    request
        .headers_mut()
        .insert("x-queue-pass", token.parse().unwrap());

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(
        response.headers().get("x-ratelimit-bypass").unwrap(),
        "queue-pass"
    );
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn tampered_pass_is_rejected_with_its_reason() {
    let harness = harness(100).await;
    harness.state.queue_mode.set_enabled(true);
    let router = build_router(harness.state);

    let mut request = booking_request(Uuid::new_v4(), &unique_key(), &booking_body());
    request
        .headers_mut()
        .insert("x-queue-pass", "not.a.jwt".parse().unwrap());

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_string(response).await;
    assert!(body.contains("invalid queue pass"));
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn revoked_pass_fails_the_store_cross_check() {
    let harness = harness(100).await;
    harness.state.queue_mode.set_enabled(true);
    let user = Uuid::new_v4();
    let event = EventId::from("ev-1");

    // Signed but never mirrored: the cross-check refuses it.
    let (token, _) = harness
        .state
        .pass_issuer
        .issue(UserId(user), &event)
        .unwrap();

    let router = build_router(harness.state);
    let mut request = booking_request(user, &unique_key(), &booking_body());
    request
        .headers_mut()
        .insert("x-queue-pass", token.parse().unwrap());

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn queue_mode_endpoints_toggle_the_flag() {
    let harness = harness(100).await;
    let router = build_router(harness.state);

    let read = Request::builder()
        .method("GET")
        .uri("/api/v1/queue-mode")
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(read).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_string(response).await.contains("\"queue_mode_enabled\":false"));

    let flip = Request::builder()
        .method("PUT")
        .uri("/api/v1/queue-mode")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"enabled":true}"#))
        .unwrap();
    let response = router.clone().oneshot(flip).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_string(response).await.contains("\"queue_mode_enabled\":true"));
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn queue_join_and_position_round_trip() {
    let harness = harness(100).await;
    let router = build_router(harness.state);
    let user = Uuid::new_v4();
    let event = format!("test-event-{}", Uuid::new_v4());

    let join = Request::builder()
        .method("POST")
        .uri("/api/v1/queue/join")
        .header("content-type", "application/json")
        .header("x-user-id", user.to_string())
        .body(Body::from(format!(r#"{{"event_id":"{event}"}}"#)))
        .unwrap();
    let response = router.clone().oneshot(join).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_string(response).await;
    assert!(body.contains("\"position\":1"));

    let position = Request::builder()
        .method("GET")
        .uri(format!("/api/v1/queue/position?event_id={event}"))
        .header("x-user-id", user.to_string())
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(position).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_string(response).await.contains("\"position\":1"));
}
