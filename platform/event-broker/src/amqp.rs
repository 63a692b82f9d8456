//! AMQP (RabbitMQ) implementation of the [`Broker`] trait.
//!
//! One connection per process. Publishing goes through a shared channel
//! behind a mutex; every subscription gets its own channel with prefetch 10
//! and manual acknowledgement. A supervisor task reconnects with a fixed
//! 3-second delay and replays declared topology and registered consumers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use lapin::{
    message::Delivery,
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
        BasicQosOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
    },
    types::{AMQPValue, FieldTable},
    BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind,
};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn, Instrument};

use crate::retry::{retry_with_backoff, RetryConfig};
use crate::{Broker, BrokerError, BrokerResult, EventHandler, HandlerOutcome, DLQ_QUEUE, DLX_EXCHANGE};

/// Unacknowledged deliveries in flight per consumer channel.
const PREFETCH: u16 = 10;
/// Fixed delay between reconnect attempts.
const RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Durable topology declared so far, replayed after every reconnect.
#[derive(Default)]
struct Topology {
    exchanges: Vec<String>,
    queues: Vec<String>,
    bindings: Vec<(String, String, String)>,
}

struct ConsumerReg {
    queue: String,
    handler: Arc<dyn EventHandler>,
}

struct Inner {
    url: String,
    conn: RwLock<Option<Connection>>,
    /// Shared publisher channel. The mutex serializes publishes.
    publisher: Mutex<Option<Channel>>,
    topology: Mutex<Topology>,
    consumers: Mutex<Vec<ConsumerReg>>,
    closed: AtomicBool,
}

/// RabbitMQ-backed broker.
#[derive(Clone)]
pub struct AmqpBroker {
    inner: Arc<Inner>,
}

impl AmqpBroker {
    /// Connect, set up the dead-letter topology, and start the reconnect
    /// supervisor.
    pub async fn connect(url: &str) -> BrokerResult<Self> {
        let inner = Arc::new(Inner {
            url: url.to_string(),
            conn: RwLock::new(None),
            publisher: Mutex::new(None),
            topology: Mutex::new(Topology::default()),
            consumers: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        });

        Inner::establish(&inner).await?;
        info!(url = %url, "Connected to AMQP broker");

        tokio::spawn(Inner::supervise(Arc::clone(&inner)));

        Ok(Self { inner })
    }

    /// Startup policy: retry the initial connection a bounded number of
    /// times, then give up so the process can abort with a non-zero exit.
    pub async fn connect_with_retry(
        url: &str,
        attempts: u32,
        delay: Duration,
    ) -> BrokerResult<Self> {
        let mut last_err = None;
        for attempt in 1..=attempts {
            match Self::connect(url).await {
                Ok(broker) => return Ok(broker),
                Err(e) => {
                    warn!(
                        attempt = attempt,
                        max_attempts = attempts,
                        error = %e,
                        "Broker unreachable, retrying"
                    );
                    last_err = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
        Err(last_err.unwrap_or(BrokerError::NotInitialized))
    }

    async fn try_publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
    ) -> BrokerResult<()> {
        // Hold the lock for the whole publish so the shared channel is
        // never used from two publishers at once.
        let mut guard = self.inner.publisher.lock().await;

        let channel = match guard.as_ref() {
            Some(ch) if ch.status().connected() => ch.clone(),
            Some(_) | None => {
                let conn_guard = self.inner.conn.read().await;
                let conn = conn_guard.as_ref().ok_or(BrokerError::NotInitialized)?;
                let ch = conn
                    .create_channel()
                    .await
                    .map_err(|e| BrokerError::Connection(format!("publisher channel: {}", e)))?;
                *guard = Some(ch.clone());
                ch
            }
        };

        let mut headers = FieldTable::default();
        headers.insert(
            "x-published-at".into(),
            AMQPValue::LongString(Utc::now().to_rfc3339().into()),
        );

        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_delivery_mode(2) // persistent
            .with_timestamp(Utc::now().timestamp() as u64)
            .with_headers(headers);

        let confirm = channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                payload,
                properties,
            )
            .await
            .map_err(|e| BrokerError::PublishFailed(e.to_string()))?;

        confirm
            .await
            .map_err(|e| BrokerError::PublishFailed(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl Broker for AmqpBroker {
    async fn declare_topic_exchange(&self, name: &str) -> BrokerResult<()> {
        let channel = self.inner.any_channel().await?;
        Inner::declare_exchange_on(&channel, name).await?;

        let mut topology = self.inner.topology.lock().await;
        if !topology.exchanges.iter().any(|e| e == name) {
            topology.exchanges.push(name.to_string());
        }
        Ok(())
    }

    async fn declare_queue(&self, name: &str) -> BrokerResult<()> {
        let channel = self.inner.any_channel().await?;
        Inner::declare_queue_on(&channel, name).await?;

        let mut topology = self.inner.topology.lock().await;
        if !topology.queues.iter().any(|q| q == name) {
            topology.queues.push(name.to_string());
        }
        Ok(())
    }

    async fn bind_queue(&self, queue: &str, exchange: &str, keys: &[&str]) -> BrokerResult<()> {
        let channel = self.inner.any_channel().await?;
        for key in keys {
            Inner::bind_on(&channel, queue, exchange, key).await?;
        }

        let mut topology = self.inner.topology.lock().await;
        for key in keys {
            let entry = (queue.to_string(), exchange.to_string(), key.to_string());
            if !topology.bindings.contains(&entry) {
                topology.bindings.push(entry);
            }
        }
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: Vec<u8>,
    ) -> BrokerResult<()> {
        let result = retry_with_backoff(
            || self.try_publish(exchange, routing_key, &payload),
            &RetryConfig::publisher(),
            "amqp_publish",
        )
        .await;

        match result {
            Ok(()) => {
                debug!(exchange = %exchange, routing_key = %routing_key, "Published message");
                Ok(())
            }
            Err(BrokerError::NotInitialized) => Err(BrokerError::NotInitialized),
            Err(BrokerError::PublishFailed(msg)) => Err(BrokerError::PublishFailed(msg)),
            Err(e) => Err(BrokerError::PublishFailed(e.to_string())),
        }
    }

    async fn consume(&self, queue: &str, handler: Arc<dyn EventHandler>) -> BrokerResult<()> {
        self.inner.consumers.lock().await.push(ConsumerReg {
            queue: queue.to_string(),
            handler: Arc::clone(&handler),
        });

        self.inner.spawn_consumer(queue, handler).await
    }

    async fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        if let Some(conn) = self.inner.conn.write().await.take() {
            let _ = conn.close(0, "shutdown").await;
        }
        info!("AMQP broker closed");
    }
}

impl Inner {
    /// Dial the broker, open the publisher channel, and declare the
    /// dead-letter topology.
    async fn establish(inner: &Arc<Inner>) -> BrokerResult<()> {
        let conn = Connection::connect(&inner.url, ConnectionProperties::default())
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;

        let channel = conn
            .create_channel()
            .await
            .map_err(|e| BrokerError::Connection(format!("publisher channel: {}", e)))?;

        // DLX topology: direct exchange + one queue for every poisoned
        // message in the deployment.
        channel
            .exchange_declare(
                DLX_EXCHANGE,
                ExchangeKind::Direct,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::Declare(format!("dlx exchange: {}", e)))?;

        channel
            .queue_declare(
                DLQ_QUEUE,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::Declare(format!("dlq queue: {}", e)))?;

        channel
            .queue_bind(
                DLQ_QUEUE,
                DLX_EXCHANGE,
                DLQ_QUEUE,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::Declare(format!("dlq binding: {}", e)))?;

        *inner.conn.write().await = Some(conn);
        *inner.publisher.lock().await = Some(channel);

        Ok(())
    }

    /// Watch the connection; on loss, reconnect with a fixed delay and
    /// replay topology and consumer registrations.
    async fn supervise(inner: Arc<Inner>) {
        loop {
            tokio::time::sleep(Duration::from_secs(1)).await;

            if inner.closed.load(Ordering::SeqCst) {
                return;
            }

            let connected = inner
                .conn
                .read()
                .await
                .as_ref()
                .map(|c| c.status().connected())
                .unwrap_or(false);
            if connected {
                continue;
            }

            warn!("AMQP connection lost, reconnecting");

            loop {
                if inner.closed.load(Ordering::SeqCst) {
                    return;
                }

                match Self::establish(&inner).await {
                    Ok(()) => match Self::replay(&inner).await {
                        Ok(()) => {
                            info!("AMQP connection re-established");
                            break;
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to replay topology after reconnect");
                        }
                    },
                    Err(e) => {
                        error!(
                            error = %e,
                            delay_secs = RECONNECT_DELAY.as_secs(),
                            "Reconnect attempt failed"
                        );
                    }
                }

                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }

    /// Re-declare exchanges, queues, and bindings, then respawn every
    /// registered consumer on a fresh channel.
    async fn replay(inner: &Arc<Inner>) -> BrokerResult<()> {
        let channel = inner.any_channel().await?;

        {
            let topology = inner.topology.lock().await;
            for exchange in &topology.exchanges {
                Self::declare_exchange_on(&channel, exchange).await?;
            }
            for queue in &topology.queues {
                Self::declare_queue_on(&channel, queue).await?;
            }
            for (queue, exchange, key) in &topology.bindings {
                Self::bind_on(&channel, queue, exchange, key).await?;
            }
        }

        let regs: Vec<(String, Arc<dyn EventHandler>)> = inner
            .consumers
            .lock()
            .await
            .iter()
            .map(|r| (r.queue.clone(), Arc::clone(&r.handler)))
            .collect();

        for (queue, handler) in regs {
            inner.spawn_consumer(&queue, handler).await?;
        }

        Ok(())
    }

    async fn declare_exchange_on(channel: &Channel, name: &str) -> BrokerResult<()> {
        channel
            .exchange_declare(
                name,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::Declare(format!("exchange {}: {}", name, e)))
    }

    async fn declare_queue_on(channel: &Channel, name: &str) -> BrokerResult<()> {
        let mut args = FieldTable::default();
        args.insert(
            "x-dead-letter-exchange".into(),
            AMQPValue::LongString(DLX_EXCHANGE.into()),
        );
        args.insert(
            "x-dead-letter-routing-key".into(),
            AMQPValue::LongString(DLQ_QUEUE.into()),
        );

        channel
            .queue_declare(
                name,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                args,
            )
            .await
            .map(|_| ())
            .map_err(|e| BrokerError::Declare(format!("queue {}: {}", name, e)))
    }

    async fn bind_on(channel: &Channel, queue: &str, exchange: &str, key: &str) -> BrokerResult<()> {
        channel
            .queue_bind(
                queue,
                exchange,
                key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::Declare(format!("binding {} -> {}: {}", exchange, queue, e)))
    }

    /// A short-lived channel for topology declarations.
    async fn any_channel(&self) -> BrokerResult<Channel> {
        let conn_guard = self.conn.read().await;
        let conn = conn_guard.as_ref().ok_or(BrokerError::NotInitialized)?;
        conn.create_channel()
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))
    }

    /// Open a dedicated channel and start delivering to the handler.
    async fn spawn_consumer(
        &self,
        queue: &str,
        handler: Arc<dyn EventHandler>,
    ) -> BrokerResult<()> {
        let conn_guard = self.conn.read().await;
        let conn = conn_guard.as_ref().ok_or(BrokerError::NotInitialized)?;

        let channel = conn
            .create_channel()
            .await
            .map_err(|e| BrokerError::Subscribe(e.to_string()))?;

        channel
            .basic_qos(PREFETCH, BasicQosOptions::default())
            .await
            .map_err(|e| BrokerError::Subscribe(e.to_string()))?;

        let mut consumer = channel
            .basic_consume(
                queue,
                &format!("{}-consumer", queue),
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::Subscribe(e.to_string()))?;

        let queue_name = queue.to_string();
        info!(queue = %queue_name, "Consumer started");

        tokio::spawn(async move {
            // The channel must outlive the consumer stream.
            let _channel = channel;

            while let Some(delivery) = consumer.next().await {
                match delivery {
                    Ok(delivery) => {
                        Self::process_delivery(&queue_name, delivery, &handler).await;
                    }
                    Err(e) => {
                        error!(queue = %queue_name, error = %e, "Consumer delivery error");
                        break;
                    }
                }
            }

            // The supervisor re-registers this consumer after reconnect.
            warn!(queue = %queue_name, "Consumer stream ended");
        });

        Ok(())
    }

    async fn process_delivery(queue: &str, delivery: Delivery, handler: &Arc<dyn EventHandler>) {
        let routing_key = delivery.routing_key.as_str().to_string();

        let span = tracing::info_span!(
            "broker.consume",
            queue = %queue,
            routing_key = %routing_key
        );

        let outcome = handler
            .handle(&routing_key, &delivery.data)
            .instrument(span)
            .await;

        match outcome {
            HandlerOutcome::Done | HandlerOutcome::Compensated => {
                if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                    error!(queue = %queue, routing_key = %routing_key, error = %e, "Failed to ack");
                }
            }
            HandlerOutcome::Poison(reason) => {
                error!(
                    queue = %queue,
                    routing_key = %routing_key,
                    reason = %reason,
                    "Poison message, dead-lettering"
                );
                if let Err(e) = delivery
                    .nack(BasicNackOptions {
                        requeue: false,
                        ..Default::default()
                    })
                    .await
                {
                    error!(queue = %queue, routing_key = %routing_key, error = %e, "Failed to nack");
                }
            }
        }
    }
}
