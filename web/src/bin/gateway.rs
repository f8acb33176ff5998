//! Gateway binary: HTTP boundary plus the admission stack.

use rushgate_admission::SharedLimiter;
use rushgate_core::Config;
use rushgate_postgres::{BookingRepository, Database};
use rushgate_store::inventory::InventoryOptions;
use rushgate_store::{
    scripts, IdempotencyStore, QueuePassStore, RedisClient, ReservationStore, SharedTokenBucket,
    VirtualQueue,
};
use rushgate_web::{build_router, AppState};
use std::sync::Arc;
use std::time::Duration;
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
    let idempotency = IdempotencyStore::new(&redis, call_timeout, config.admission.idempotency_ttl_secs);
    let bookings = BookingRepository::new(&database);

    let shared_bucket = SharedTokenBucket::new(
        &redis,
        Arc::clone(&script_set),
        call_timeout,
        "shared",
        config.admission.default_rate_per_sec,
        config.admission.default_burst,
    );
    let shared_limiter = SharedLimiter::new(shared_bucket, config.admission.default_burst);

    let state = AppState::new(
        Arc::new(reservations),
        Arc::new(bookings),
        queue,
        passes,
        idempotency,
        Some(shared_limiter),
        config.admission.clone(),
        config.server.max_in_flight,
    );

    let sweepers = state
        .limiters
        .spawn_sweepers(Duration::from_secs(60), Duration::from_secs(300));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "gateway listening");

    let router = build_router(state);
    let mut server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
    });

    tokio::select! {
        joined = &mut server => {
            // The listener died without a signal; surface the error.
            for sweeper in &sweepers {
                sweeper.abort();
            }
            joined??;
            return Ok(());
        }
        _ = tokio::signal::ctrl_c() => {}
    }

    tracing::info!("shutdown signal received, draining in-flight requests");
    let drain = Duration::from_secs(config.server.shutdown_timeout_secs);
    match tokio::time::timeout(drain, &mut server).await {
        Ok(joined) => joined??,
        Err(_) => {
            tracing::warn!("gateway did not drain within the shutdown timeout");
            server.abort();
        }
    }

    for sweeper in &sweepers {
        sweeper.abort();
    }
    tracing::info!("gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
