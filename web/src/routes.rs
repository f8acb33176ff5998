//! Router assembly.

use crate::handlers::{admin, bookings, health, queue, queue_mode};
use crate::middleware::{
    concurrency_middleware, idempotency_middleware, queue_pass_middleware, rate_limit_middleware,
};
use crate::state::AppState;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post, put};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

/// Build the gateway router with the full admission stack.
///
/// Middleware executes top to bottom: concurrency cap, queue-pass
/// validation and gate, rate limiting, idempotency.
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/bookings", post(bookings::create_booking))
        .route("/bookings/:id", get(bookings::get_booking))
        .route("/bookings/:id/confirm", post(bookings::confirm_booking))
        .route("/bookings/:id/cancel", post(bookings::cancel_booking))
        .route("/users/:id/bookings", get(bookings::list_user_bookings))
        .route("/queue/join", post(queue::join))
        .route("/queue/position", get(queue::position))
        .route("/queue/heartbeat", post(queue::heartbeat))
        .route("/queue/leave", post(queue::leave))
        .route(
            "/queue-mode",
            get(queue_mode::get_queue_mode).put(queue_mode::set_queue_mode),
        )
        .route(
            "/admin/zones/:zone_id/availability",
            get(admin::get_availability).put(admin::set_availability),
        );

    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .nest("/api/v1", api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(from_fn_with_state(state.clone(), concurrency_middleware))
                .layer(from_fn_with_state(state.clone(), queue_pass_middleware))
                .layer(from_fn_with_state(state.clone(), rate_limit_middleware))
                .layer(from_fn_with_state(state.clone(), idempotency_middleware)),
        )
        .with_state(state)
}
