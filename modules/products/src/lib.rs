pub mod cache;
pub mod config;
pub mod consumers;
pub mod db;
pub mod events;
pub mod health;
pub mod repos;
pub mod routes;
pub mod services;

use std::sync::Arc;

use axum::{
    routing::get,
    Router,
};
use sqlx::PgPool;

use crate::cache::ProductCache;
use event_broker::Broker;

pub use consumers::order_consumer::{OrderEventsConsumer, ORDER_EVENTS_QUEUE};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub cache: ProductCache,
    pub broker: Arc<dyn Broker>,
}

/// Build the HTTP router for the product service.
pub fn app(state: AppState) -> Router {
    use crate::routes::products::{
        create_product, delete_product, get_product, list_products, update_product,
    };

    Router::new()
        .route("/api/health", get(health::health))
        .route("/api/products", get(list_products).post(create_product))
        .route(
            "/api/products/{id}",
            get(get_product).put(update_product).delete(delete_product),
        )
        .with_state(state)
}
