use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

use event_broker::{AmqpBroker, Broker};
use event_contracts::{exchange, keys};
use orders_rs::{
    app, clients::cart_client::CartClient, config::Config, db, AppState, SagaEventsConsumer,
    SAGA_EVENTS_QUEUE,
};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    tracing::info!("Starting order service...");

    let config = Config::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Connecting to database...");
    let pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Running migrations...");
    sqlx::migrate!("./db/migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    tracing::info!("Connecting to broker at {}", config.amqp_url);
    let broker: Arc<dyn Broker> = Arc::new(
        AmqpBroker::connect_with_retry(&config.amqp_url, 10, Duration::from_secs(3))
            .await
            .expect("Broker unreachable after startup retries"),
    );

    broker
        .declare_topic_exchange(exchange::ORDER)
        .await
        .expect("Failed to declare order exchange");
    broker
        .declare_queue(SAGA_EVENTS_QUEUE)
        .await
        .expect("Failed to declare queue");
    broker
        .bind_queue(
            SAGA_EVENTS_QUEUE,
            exchange::ORDER,
            &[
                keys::PAYMENT_SUCCEEDED,
                keys::PAYMENT_FAILED,
                keys::INVENTORY_RESERVATION_FAILED,
            ],
        )
        .await
        .expect("Failed to bind queue");

    let consumer = SagaEventsConsumer::new(pool.clone(), Arc::clone(&broker));
    broker
        .consume(SAGA_EVENTS_QUEUE, Arc::new(consumer))
        .await
        .expect("Failed to start saga events consumer");

    let state = AppState {
        pool,
        broker,
        cart: CartClient::new(&config.cart_service_url),
        currency: config.currency.clone(),
    };

    let router = app(state).layer(
        CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Order service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, router)
        .await
        .expect("Server failed to start");
}
