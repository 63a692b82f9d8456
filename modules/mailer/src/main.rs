use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use tracing_subscriber::EnvFilter;

use event_broker::{AmqpBroker, Broker};
use event_contracts::{exchange, keys};
use mailer_rs::{config::Config, health, Mailer, PaymentEventsConsumer, PAYMENT_EVENTS_QUEUE};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    tracing::info!("Starting mailer service...");

    let config = Config::from_env().expect("Failed to load configuration from environment");

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
        .declare_queue(PAYMENT_EVENTS_QUEUE)
        .await
        .expect("Failed to declare queue");
    broker
        .bind_queue(PAYMENT_EVENTS_QUEUE, exchange::ORDER, &[keys::PAYMENT_SUCCEEDED])
        .await
        .expect("Failed to bind queue");

    let mailer = Mailer::new(
        &config.smtp_host,
        config.smtp_port,
        config.mail_from.clone(),
        config.mail_to.clone(),
    );

    broker
        .consume(PAYMENT_EVENTS_QUEUE, Arc::new(PaymentEventsConsumer::new(mailer)))
        .await
        .expect("Failed to start payment events consumer");

    let router = Router::new().route("/api/health", get(health::health));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Mailer service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, router)
        .await
        .expect("Server failed to start");
}
