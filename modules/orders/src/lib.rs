pub mod clients;
pub mod config;
pub mod consumers;
pub mod db;
pub mod events;
pub mod health;
pub mod repos;
pub mod routes;

use std::sync::Arc;

use axum::{
    routing::{get, put},
    Router,
};
use sqlx::PgPool;

use crate::clients::cart_client::CartClient;
use event_broker::Broker;

pub use consumers::saga_consumer::{SagaEventsConsumer, SAGA_EVENTS_QUEUE};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub broker: Arc<dyn Broker>,
    pub cart: CartClient,
    pub currency: String,
}

/// Build the HTTP router for the order service.
pub fn app(state: AppState) -> Router {
    use crate::routes::orders::{create_order, get_order, list_orders, update_order_status};

    Router::new()
        .route("/api/health", get(health::health))
        .route("/api/orders", get(list_orders).post(create_order))
        .route("/api/orders/{id}", get(get_order))
        .route("/api/orders/{id}/status", put(update_order_status))
        .with_state(state)
}
