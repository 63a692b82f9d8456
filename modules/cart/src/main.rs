use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

use cart_rs::{
    app, clients::product_client::ProductClient, config::Config, db, AppState,
    OrderEventsConsumer, ProductEventsConsumer, ORDER_EVENTS_QUEUE, PRODUCT_EVENTS_QUEUE,
};
use event_broker::{AmqpBroker, Broker};
use event_contracts::{exchange, keys};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    tracing::info!("Starting cart service...");

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
        .declare_topic_exchange(exchange::PRODUCT)
        .await
        .expect("Failed to declare product exchange");

    broker
        .declare_queue(PRODUCT_EVENTS_QUEUE)
        .await
        .expect("Failed to declare product events queue");
    broker
        .bind_queue(PRODUCT_EVENTS_QUEUE, exchange::PRODUCT, &["product.*"])
        .await
        .expect("Failed to bind product events queue");
    broker
        .consume(
            PRODUCT_EVENTS_QUEUE,
            Arc::new(ProductEventsConsumer::new(pool.clone())),
        )
        .await
        .expect("Failed to start product events consumer");

    broker
        .declare_queue(ORDER_EVENTS_QUEUE)
        .await
        .expect("Failed to declare order events queue");
    broker
        .bind_queue(
            ORDER_EVENTS_QUEUE,
            exchange::ORDER,
            &[keys::ORDER_CREATED, keys::ORDER_REQUESTED],
        )
        .await
        .expect("Failed to bind order events queue");
    broker
        .consume(
            ORDER_EVENTS_QUEUE,
            Arc::new(OrderEventsConsumer::new(pool.clone())),
        )
        .await
        .expect("Failed to start order events consumer");

    let state = AppState {
        pool,
        products: ProductClient::new(&config.product_service_url),
    };

    let router = app(state).layer(
        CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Cart service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, router)
        .await
        .expect("Server failed to start");
}
