//! Worker binary: settlement, queue release, outbox relay, expiry sweep
//! and payment consumption under one graceful-shutdown umbrella.

use rushgate_admission::QueuePassIssuer;
use rushgate_core::events::{TOPIC_BOOKING_EVENTS, TOPIC_PAYMENT_EVENTS};
use rushgate_core::Config;
use rushgate_eventlog::{LogConsumer, LogProducer};
use rushgate_postgres::{
    BookingRepository, Database, OutboxRepository, SettlementRepository,
};
use rushgate_store::inventory::InventoryOptions;
use rushgate_store::{scripts, QueuePassStore, RedisClient, ReservationStore, VirtualQueue};
use rushgate_workers::{
    ExpirySweeper, OutboxRelay, PaymentConsumer, QueueReleaseWorker, SettlementWorker,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.server.log_filter.clone()))
        .init();

    let call_timeout = Duration::from_millis(config.server.request_timeout_ms);

    let redis = RedisClient::connect(
        &config.redis.url,
        Duration::from_secs(config.redis.connect_timeout_secs),
    )
    .await?;
    let mut conn = redis.conn();
    scripts::load_all(&mut conn).await?;
    let script_set = Arc::new(scripts::ScriptSet::new());

    let database = Database::connect(&config.postgres).await?;
    database.migrate().await?;

    let reservations = ReservationStore::new(
        &redis,
        Arc::clone(&script_set),
        InventoryOptions {
            call_timeout,
            max_seats_per_user: config.admission.max_seats_per_user,
            reservation_ttl_secs: i64::try_from(config.admission.reservation_ttl_secs)?,
            reservation_max_ttl_secs: i64::try_from(config.admission.reservation_max_ttl_secs)?,
        },
    );
    let queue = VirtualQueue::new(&redis, Arc::clone(&script_set), call_timeout);
    let passes = QueuePassStore::new(&redis, call_timeout);
    let bookings = BookingRepository::new(&database);

    // Startup blocks on log connectivity; exhausted retries are fatal.
    let producer = LogProducer::connect(&config.kafka).await?;
    let settlement_consumer = LogConsumer::connect(
        &config.kafka,
        &config.kafka.settlement_group,
        &[TOPIC_BOOKING_EVENTS],
    )
    .await?;
    let payment_consumer = LogConsumer::connect(
        &config.kafka,
        &config.kafka.payment_group,
        &[TOPIC_PAYMENT_EVENTS],
    )
    .await?;

    let cancel = CancellationToken::new();
    let mut tasks = Vec::new();

    let settlement = SettlementWorker::new(
        settlement_consumer,
        SettlementRepository::new(&database),
        config.worker.settlement_batch_size,
        Duration::from_millis(config.worker.settlement_flush_ms),
    );
    tasks.push(tokio::spawn(settlement.run(cancel.clone())));

    let release = Arc::new(QueueReleaseWorker::new(
        queue,
        passes,
        Arc::new(QueuePassIssuer::new(
            &config.admission.queue_pass_secret,
            config.admission.queue_pass_ttl_secs,
        )),
        config.worker.release_batch_size,
        Duration::from_secs(config.admission.queue_idle_timeout_secs),
    ));
    tasks.push(tokio::spawn(Arc::clone(&release).run(
        Duration::from_millis(config.worker.release_interval_ms),
        cancel.clone(),
    )));

    let relay = OutboxRelay::new(
        OutboxRepository::new(&database),
        producer,
        config.worker.outbox_batch_size,
        Duration::from_millis(config.worker.outbox_poll_ms),
    );
    tasks.push(tokio::spawn(relay.run(cancel.clone())));

    let sweeper = ExpirySweeper::new(bookings.clone(), reservations.clone(), 500);
    tasks.push(tokio::spawn(sweeper.run(
        Duration::from_millis(config.worker.expiry_sweep_ms),
        cancel.clone(),
    )));

    let payments = PaymentConsumer::new(
        payment_consumer,
        Arc::new(reservations),
        Arc::new(bookings),
    );
    tasks.push(tokio::spawn(payments.run(cancel.clone())));

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received, draining workers");
    cancel.cancel();

    let drain = Duration::from_secs(config.server.shutdown_timeout_secs);
    if tokio::time::timeout(drain, futures_join_all(tasks)).await.is_err() {
        tracing::warn!("workers did not drain within the shutdown timeout");
    }
    tracing::info!("worker stopped");
    Ok(())
}

async fn futures_join_all(tasks: Vec<tokio::task::JoinHandle<()>>) {
    for task in tasks {
        let _ = task.await;
    }
}
