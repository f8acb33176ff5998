//! Authoritative relational store.
//!
//! Postgres owns the durable booking rows, the outbox relay table and the
//! settled per-zone seat accounting. Uses sqlx with an explicitly sized
//! connection pool; migrations are embedded at compile time and applied
//! idempotently at startup.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bookings;
pub mod outbox;
pub mod settlement;

pub use bookings::BookingRepository;
pub use outbox::{OutboxRepository, OutboxRow};
pub use settlement::{
    aggregate, SettlementEntry, SettlementKind, SettlementRepository, ZoneDelta,
};

use rushgate_core::config::PostgresConfig;
use rushgate_core::{Error, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

/// Shared handle over the connection pool.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect with explicit pool bounds and verify connectivity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UpstreamUnavailable`] if the database is
    /// unreachable within the connect timeout.
    pub async fn connect(config: &PostgresConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.url)
            .await
            .map_err(|e| Error::UpstreamUnavailable {
                message: format!("postgres connect: {e}"),
            })?;

        tracing::info!(
            max_connections = config.max_connections,
            "connected to postgres"
        );
        Ok(Self { pool })
    }

    /// Wrap an existing pool (tests).
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply pending migrations. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] when a migration fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Internal {
                message: format!("migrations: {e}"),
            })?;
        Ok(())
    }

    /// The underlying pool, for health checks and repositories.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Liveness probe used by the readiness endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UpstreamUnavailable`] when a trivial query fails.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| Error::UpstreamUnavailable {
                message: format!("postgres ping: {e}"),
            })?;
        Ok(())
    }
}

/// Convert a sqlx failure into the domain taxonomy, flagging unique
/// violations as conflicts so the caller can surface idempotency-key and
/// duplicate-booking collisions.
pub(crate) fn db_error(operation: &'static str, err: sqlx::Error) -> Error {
    if let sqlx::Error::Database(ref db) = err {
        if db.is_unique_violation() {
            return Error::Conflict {
                message: format!("{operation}: duplicate key"),
            };
        }
    }
    match err {
        sqlx::Error::PoolTimedOut => Error::UpstreamTimeout { operation },
        sqlx::Error::Io(e) => Error::UpstreamUnavailable {
            message: format!("{operation}: {e}"),
        },
        other => Error::Internal {
            message: format!("{operation}: {other}"),
        },
    }
}
