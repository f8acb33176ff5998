//! Virtual queue, idempotency and shared-bucket tests against a live
//! Redis.
//!
//! Run with: docker run -d -p 6379:6379 redis:7-alpine
//! then: cargo test -p rushgate-store -- --ignored

use rushgate_core::{Error, EventId, UserId};
use rushgate_store::{
    scripts, BeginOutcome, IdempotencyStatus, IdempotencyStore, QueuePassStore, RedisClient,
    SharedTokenBucket, VirtualQueue,
};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const REDIS_URL: &str = "redis://127.0.0.1:6379";

async fn client() -> RedisClient {
    let client = RedisClient::connect(REDIS_URL, Duration::from_secs(2))
        .await
        .expect("redis must be running for ignored tests");
    let mut conn = client.conn();
    scripts::load_all(&mut conn).await.unwrap();
    client
}

fn unique_event() -> EventId {
    EventId(format!("test-event-{}", Uuid::new_v4()))
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn join_assigns_fifo_positions_and_pop_preserves_order() {
    let client = client().await;
    let queue = VirtualQueue::new(&client, Arc::new(scripts::ScriptSet::new()), Duration::from_secs(2));
    let event = unique_event();

    let users: Vec<UserId> = (0..5).map(|_| UserId(Uuid::new_v4())).collect();
    for (i, user) in users.iter().enumerate() {
        let outcome = queue.join(&event, *user).await.unwrap();
        assert_eq!(outcome.position, i as i64 + 1);
        assert!(!outcome.rejoined);
    }
    assert_eq!(queue.depth(&event).await.unwrap(), 5);

    let popped = queue.pop_batch(&event, 3).await.unwrap();
    assert_eq!(popped, users[0..3].to_vec());

    // Remaining users moved to the head.
    assert_eq!(queue.position(&event, users[3]).await.unwrap(), Some(1));
    assert_eq!(queue.position(&event, users[4]).await.unwrap(), Some(2));
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn rejoin_returns_original_position_and_token() {
    let client = client().await;
    let queue = VirtualQueue::new(&client, Arc::new(scripts::ScriptSet::new()), Duration::from_secs(2));
    let event = unique_event();
    let user = UserId(Uuid::new_v4());

    let first = queue.join(&event, user).await.unwrap();
    queue.join(&event, UserId(Uuid::new_v4())).await.unwrap();

    let again = queue.join(&event, user).await.unwrap();
    assert!(again.rejoined);
    assert_eq!(again.position, first.position);
    assert_eq!(again.token, first.token);
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn leave_requires_the_session_token() {
    let client = client().await;
    let queue = VirtualQueue::new(&client, Arc::new(scripts::ScriptSet::new()), Duration::from_secs(2));
    let event = unique_event();
    let user = UserId(Uuid::new_v4());

    let outcome = queue.join(&event, user).await.unwrap();

    let wrong = queue.leave(&event, user, "not-the-token").await;
    assert!(matches!(wrong, Err(Error::Conflict { .. })));

    queue.leave(&event, user, &outcome.token).await.unwrap();
    assert_eq!(queue.position(&event, user).await.unwrap(), None);

    let gone = queue.leave(&event, user, &outcome.token).await;
    assert!(matches!(gone, Err(Error::NotFound { .. })));
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn idle_entries_are_swept_while_live_ones_stay() {
    let client = client().await;
    let queue = VirtualQueue::new(&client, Arc::new(scripts::ScriptSet::new()), Duration::from_secs(2));
    let event = unique_event();
    let idle = UserId(Uuid::new_v4());
    let live = UserId(Uuid::new_v4());

    queue.join(&event, idle).await.unwrap();
    let live_join = queue.join(&event, live).await.unwrap();

    tokio::time::sleep(Duration::from_secs(2)).await;
    queue.heartbeat(&event, live, &live_join.token).await.unwrap();

    let evicted = queue
        .sweep_idle(&event, 100, Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(evicted, 1);
    assert_eq!(queue.position(&event, idle).await.unwrap(), None);
    assert_eq!(queue.position(&event, live).await.unwrap(), Some(1));
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn queue_registry_tracks_active_queues() {
    let client = client().await;
    let queue = VirtualQueue::new(&client, Arc::new(scripts::ScriptSet::new()), Duration::from_secs(2));
    let event = unique_event();
    let user = UserId(Uuid::new_v4());

    queue.join(&event, user).await.unwrap();
    assert!(queue.active_events().await.unwrap().contains(&event));

    queue.pop_batch(&event, 10).await.unwrap();
    assert!(
        !queue.active_events().await.unwrap().contains(&event),
        "drained queue deregisters"
    );
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn idempotency_first_claim_wins_and_completion_replays() {
    let client = client().await;
    let store = IdempotencyStore::new(&client, Duration::from_secs(2), 60);
    let key = format!("test-key-{}", Uuid::new_v4());

    let first = store.begin(&key, "hash-a").await.unwrap();
    assert_eq!(first, BeginOutcome::Started);

    // Second claim sees the in-flight record.
    match store.begin(&key, "hash-a").await.unwrap() {
        BeginOutcome::Existing(record) => {
            assert_eq!(record.status, IdempotencyStatus::Inflight);
            assert_eq!(record.request_hash, "hash-a");
        }
        BeginOutcome::Started => panic!("second claim must not start"),
    }

    store
        .complete(&key, "hash-a", 201, "{\"ok\":true}".into())
        .await
        .unwrap();

    match store.begin(&key, "hash-a").await.unwrap() {
        BeginOutcome::Existing(record) => {
            assert_eq!(record.status, IdempotencyStatus::Completed);
            assert_eq!(record.response_code, Some(201));
            assert_eq!(record.response_body.as_deref(), Some("{\"ok\":true}"));
        }
        BeginOutcome::Started => panic!("completed record must replay"),
    }
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn idempotency_removal_reopens_the_slot() {
    let client = client().await;
    let store = IdempotencyStore::new(&client, Duration::from_secs(2), 60);
    let key = format!("test-key-{}", Uuid::new_v4());

    assert_eq!(store.begin(&key, "h").await.unwrap(), BeginOutcome::Started);
    store.remove(&key).await.unwrap();
    assert_eq!(store.begin(&key, "h").await.unwrap(), BeginOutcome::Started);
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn shared_bucket_enforces_burst_across_handles() {
    let client = client().await;
    let scripts = Arc::new(scripts::ScriptSet::new());
    let key = format!("bucket-{}", Uuid::new_v4());

    // Two handles share one budget, as two gateway replicas would.
    let a = SharedTokenBucket::new(&client, Arc::clone(&scripts), Duration::from_secs(2), "test", 1.0, 3.0);
    let b = SharedTokenBucket::new(&client, scripts, Duration::from_secs(2), "test", 1.0, 3.0);

    assert!(a.allow(&key).await.unwrap().allowed);
    assert!(b.allow(&key).await.unwrap().allowed);
    assert!(a.allow(&key).await.unwrap().allowed);
    assert!(!b.allow(&key).await.unwrap().allowed, "burst of 3 exhausted");
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn pass_mirror_round_trips_and_revokes() {
    let client = client().await;
    let passes = QueuePassStore::new(&client, Duration::from_secs(2));
    let event = unique_event();
    let user = UserId(Uuid::new_v4());

    passes
        .store(&event, user, "signed-token", Duration::from_secs(60))
        .await
        .unwrap();
    assert_eq!(
        passes.get(&event, user).await.unwrap().as_deref(),
        Some("signed-token")
    );

    passes.revoke(&event, user).await.unwrap();
    assert_eq!(passes.get(&event, user).await.unwrap(), None);
}
