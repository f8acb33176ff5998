//! Queue release worker tests against a live Redis.
//!
//! Run with: docker run -d -p 6379:6379 redis:7-alpine
//! then: cargo test -p rushgate-workers -- --ignored

use rushgate_admission::{QueuePassIssuer, QueuePassValidator};
use rushgate_core::{EventId, UserId};
use rushgate_store::{scripts, QueuePassStore, RedisClient, VirtualQueue};
use rushgate_workers::QueueReleaseWorker;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const REDIS_URL: &str = "redis://127.0.0.1:6379";
const SECRET: &str = "release-test-secret";

async fn worker(batch: usize) -> (Arc<QueueReleaseWorker>, VirtualQueue, QueuePassStore) {
    let client = RedisClient::connect(REDIS_URL, Duration::from_secs(2))
        .await
        .expect("redis must be running for ignored tests");
    let mut conn = client.conn();
    scripts::load_all(&mut conn).await.unwrap();
    let script_set = Arc::new(scripts::ScriptSet::new());

    let queue = VirtualQueue::new(&client, Arc::clone(&script_set), Duration::from_secs(2));
    let passes = QueuePassStore::new(&client, Duration::from_secs(2));
    let worker = Arc::new(QueueReleaseWorker::new(
        queue.clone(),
        passes.clone(),
        Arc::new(QueuePassIssuer::new(SECRET, 300)),
        batch,
        Duration::from_secs(120),
    ));
    (worker, queue, passes)
}

fn unique_event() -> EventId {
    EventId(format!("release-event-{}", Uuid::new_v4()))
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn release_pops_a_batch_and_issues_stored_passes() {
    let (worker, queue, passes) = worker(3).await;
    let event = unique_event();

    let users: Vec<UserId> = (0..5).map(|_| UserId(Uuid::new_v4())).collect();
    for user in &users {
        queue.join(&event, *user).await.unwrap();
    }

    let released = worker.release_once(&event).await.unwrap();
    assert_eq!(released.len(), 3, "batch size bounds the release");

    let validator = QueuePassValidator::new(SECRET);
    for user in &released {
        // The pass validates and the mirror holds the exact token.
        let claims = validator.validate(&user.queue_pass).unwrap();
        assert_eq!(claims.user_id, user.user_id);
        assert_eq!(claims.event_id, event);
        let stored = passes.get(&event, user.user_id).await.unwrap();
        assert_eq!(stored.as_deref(), Some(user.queue_pass.as_str()));
    }

    // The two unreleased users moved up.
    assert_eq!(queue.depth(&event).await.unwrap(), 2);
    assert_eq!(queue.position(&event, users[3]).await.unwrap(), Some(1));

    let metrics = worker.metrics();
    assert_eq!(metrics.total_released, 3);
    assert_eq!(metrics.last_release_count, 3);
    assert!(metrics.last_release_time.is_some());
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn empty_queue_releases_nothing() {
    let (worker, _queue, _passes) = worker(10).await;
    let released = worker.release_once(&unique_event()).await.unwrap();
    assert!(released.is_empty());
    assert_eq!(worker.metrics().total_released, 0);
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn batch_resize_takes_effect_on_the_next_release() {
    let (worker, queue, _passes) = worker(2).await;
    let event = unique_event();
    for _ in 0..6 {
        queue.join(&event, UserId(Uuid::new_v4())).await.unwrap();
    }

    assert_eq!(worker.release_once(&event).await.unwrap().len(), 2);
    worker.set_batch_size(4);
    assert_eq!(worker.release_once(&event).await.unwrap().len(), 4);
    assert_eq!(worker.metrics().total_released, 6);
}
