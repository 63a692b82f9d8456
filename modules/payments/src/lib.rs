pub mod config;
pub mod consumers;
pub mod db;
pub mod events;
pub mod health;
pub mod repos;
pub mod routes;

use std::sync::Arc;

use axum::{routing::get, Router};
use sqlx::PgPool;

use event_broker::Broker;

pub use consumers::reservation_consumer::{ReservationConsumer, ORDER_EVENTS_QUEUE};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub broker: Arc<dyn Broker>,
}

/// Build the HTTP router for the payment service.
pub fn app(state: AppState) -> Router {
    use crate::routes::payments::get_payment;

    Router::new()
        .route("/api/health", get(health::health))
        .route("/api/payments/{order_uuid}", get(get_payment))
        .with_state(state)
}
