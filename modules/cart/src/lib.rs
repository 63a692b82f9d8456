pub mod clients;
pub mod config;
pub mod consumers;
pub mod db;
pub mod health;
pub mod repos;
pub mod routes;

use axum::{
    routing::{get, post},
    Router,
};
use sqlx::PgPool;

use crate::clients::product_client::ProductClient;

pub use consumers::order_consumer::{
    OrderEventsConsumer, ORDER_EVENTS_QUEUE,
};
pub use consumers::product_consumer::{ProductEventsConsumer, PRODUCT_EVENTS_QUEUE};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub products: ProductClient,
}

/// Build the HTTP router for the cart service.
pub fn app(state: AppState) -> Router {
    use crate::routes::cart::{add_to_cart, clear_cart, get_cart};

    Router::new()
        .route("/api/health", get(health::health))
        .route("/api/cart", post(add_to_cart).get(get_cart).delete(clear_cart))
        .with_state(state)
}
