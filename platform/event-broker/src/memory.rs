//! In-memory implementation of the [`Broker`] trait for tests and local dev.
//!
//! Same routing semantics as the AMQP implementation: durable-queue
//! buffering (messages published before a consumer registers are retained),
//! `*`/`#` topic wildcards, FIFO per queue, and poison messages recorded in
//! an inspectable dead-letter store instead of a broker-side DLQ.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info_span, Instrument};

use crate::{Broker, BrokerError, BrokerResult, EventHandler, HandlerOutcome};

/// A message that a handler rejected as poison.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub queue: String,
    pub routing_key: String,
    pub body: Vec<u8>,
    pub reason: String,
}

struct Queue {
    tx: mpsc::UnboundedSender<(String, Vec<u8>)>,
    /// Taken by the first (and only) consumer of this queue.
    rx: Option<mpsc::UnboundedReceiver<(String, Vec<u8>)>>,
}

#[derive(Clone, PartialEq, Eq)]
struct Binding {
    queue: String,
    exchange: String,
    pattern: String,
}

struct MemInner {
    exchanges: Mutex<Vec<String>>,
    queues: Mutex<HashMap<String, Queue>>,
    bindings: Mutex<Vec<Binding>>,
    dead_letters: Mutex<Vec<DeadLetter>>,
}

/// In-process broker with AMQP topic routing semantics.
#[derive(Clone)]
pub struct MemoryBroker {
    inner: Arc<MemInner>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MemInner {
                exchanges: Mutex::new(Vec::new()),
                queues: Mutex::new(HashMap::new()),
                bindings: Mutex::new(Vec::new()),
                dead_letters: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Snapshot of every message handlers rejected as poison.
    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        self.inner.dead_letters.lock().await.clone()
    }

    /// Topic pattern match: `*` matches exactly one dot-separated segment,
    /// `#` matches zero or more.
    fn topic_match(pattern: &str, key: &str) -> bool {
        fn rec(p: &[&str], k: &[&str]) -> bool {
            match (p.first(), k.first()) {
                (None, None) => true,
                (Some(&"#"), _) => {
                    if rec(&p[1..], k) {
                        return true;
                    }
                    if !k.is_empty() {
                        rec(p, &k[1..])
                    } else {
                        false
                    }
                }
                (Some(&"*"), Some(_)) => rec(&p[1..], &k[1..]),
                (Some(&seg), Some(&word)) if seg == word => rec(&p[1..], &k[1..]),
                _ => false,
            }
        }

        let pattern: Vec<&str> = pattern.split('.').collect();
        let key: Vec<&str> = key.split('.').collect();
        rec(&pattern, &key)
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn declare_topic_exchange(&self, name: &str) -> BrokerResult<()> {
        let mut exchanges = self.inner.exchanges.lock().await;
        if !exchanges.iter().any(|e| e == name) {
            exchanges.push(name.to_string());
        }
        Ok(())
    }

    async fn declare_queue(&self, name: &str) -> BrokerResult<()> {
        let mut queues = self.inner.queues.lock().await;
        if !queues.contains_key(name) {
            let (tx, rx) = mpsc::unbounded_channel();
            queues.insert(name.to_string(), Queue { tx, rx: Some(rx) });
        }
        Ok(())
    }

    async fn bind_queue(&self, queue: &str, exchange: &str, keys: &[&str]) -> BrokerResult<()> {
        if !self.inner.queues.lock().await.contains_key(queue) {
            return Err(BrokerError::Declare(format!("queue {} not declared", queue)));
        }

        let mut bindings = self.inner.bindings.lock().await;
        for key in keys {
            let binding = Binding {
                queue: queue.to_string(),
                exchange: exchange.to_string(),
                pattern: key.to_string(),
            };
            if !bindings.contains(&binding) {
                bindings.push(binding);
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
        if !self.inner.exchanges.lock().await.iter().any(|e| e == exchange) {
            return Err(BrokerError::PublishFailed(format!(
                "exchange {} not declared",
                exchange
            )));
        }

        let mut targets: Vec<String> = Vec::new();
        {
            let bindings = self.inner.bindings.lock().await;
            for binding in bindings.iter() {
                if binding.exchange == exchange
                    && Self::topic_match(&binding.pattern, routing_key)
                    && !targets.contains(&binding.queue)
                {
                    targets.push(binding.queue.clone());
                }
            }
        }

        // Unroutable messages are dropped, as a topic exchange drops them.
        let queues = self.inner.queues.lock().await;
        for target in targets {
            if let Some(queue) = queues.get(&target) {
                let _ = queue.tx.send((routing_key.to_string(), payload.clone()));
            }
        }
        Ok(())
    }

    async fn consume(&self, queue: &str, handler: Arc<dyn EventHandler>) -> BrokerResult<()> {
        let mut rx = {
            let mut queues = self.inner.queues.lock().await;
            let state = queues
                .get_mut(queue)
                .ok_or_else(|| BrokerError::Subscribe(format!("queue {} not declared", queue)))?;
            state
                .rx
                .take()
                .ok_or_else(|| BrokerError::Subscribe(format!("queue {} already consumed", queue)))?
        };

        let queue_name = queue.to_string();
        let inner = Arc::clone(&self.inner);

        tokio::spawn(async move {
            while let Some((routing_key, body)) = rx.recv().await {
                let span = info_span!(
                    "broker.consume",
                    queue = %queue_name,
                    routing_key = %routing_key
                );

                let outcome = handler.handle(&routing_key, &body).instrument(span).await;

                if let HandlerOutcome::Poison(reason) = outcome {
                    error!(
                        queue = %queue_name,
                        routing_key = %routing_key,
                        reason = %reason,
                        "Poison message, dead-lettering"
                    );
                    inner.dead_letters.lock().await.push(DeadLetter {
                        queue: queue_name.clone(),
                        routing_key,
                        body,
                        reason,
                    });
                }
            }
        });

        Ok(())
    }

    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Mutex as AsyncMutex;

    #[test]
    fn pattern_matching() {
        // Exact match
        assert!(MemoryBroker::topic_match("order.created", "order.created"));
        assert!(!MemoryBroker::topic_match("order.created", "order.cancelled"));

        // Single-segment wildcard
        assert!(MemoryBroker::topic_match("order.*", "order.created"));
        assert!(MemoryBroker::topic_match("*.created", "order.created"));
        assert!(!MemoryBroker::topic_match("order.*", "order.reservation.failed"));

        // Multi-segment wildcard, including zero segments
        assert!(MemoryBroker::topic_match("#", "inventory.reservation.failed"));
        assert!(MemoryBroker::topic_match("order.#", "order.created"));
        assert!(MemoryBroker::topic_match("order.#", "order"));
        assert!(MemoryBroker::topic_match("inventory.#", "inventory.reservation.failed"));
        assert!(!MemoryBroker::topic_match("payment.#", "order.created"));

        // Wildcard in the middle
        assert!(MemoryBroker::topic_match("order.*.failed", "order.reservation.failed"));
        assert!(!MemoryBroker::topic_match("order.*.failed", "order.failed"));
    }

    struct Recording {
        seen: Arc<AsyncMutex<Vec<(String, Vec<u8>)>>>,
        outcome: HandlerOutcome,
    }

    #[async_trait]
    impl EventHandler for Recording {
        async fn handle(&self, routing_key: &str, body: &[u8]) -> HandlerOutcome {
            self.seen
                .lock()
                .await
                .push((routing_key.to_string(), body.to_vec()));
            self.outcome.clone()
        }
    }

    async fn eventually<F, Fut>(what: &str, check: F)
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for _ in 0..100 {
            if check().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition never held: {}", what);
    }

    #[tokio::test]
    async fn publish_and_consume_in_order() {
        let broker = MemoryBroker::new();
        broker.declare_topic_exchange("order_exchange").await.unwrap();
        broker.declare_queue("inventory.q").await.unwrap();
        broker
            .bind_queue("inventory.q", "order_exchange", &["order.*"])
            .await
            .unwrap();

        let seen = Arc::new(AsyncMutex::new(Vec::new()));
        broker
            .consume(
                "inventory.q",
                Arc::new(Recording {
                    seen: seen.clone(),
                    outcome: HandlerOutcome::Done,
                }),
            )
            .await
            .unwrap();

        for i in 0..5u8 {
            broker
                .publish("order_exchange", "order.created", vec![i])
                .await
                .unwrap();
        }

        eventually("five deliveries", || async { seen.lock().await.len() == 5 }).await;

        let seen = seen.lock().await;
        for (i, (key, body)) in seen.iter().enumerate() {
            assert_eq!(key, "order.created");
            assert_eq!(body, &vec![i as u8]);
        }
    }

    #[tokio::test]
    async fn messages_buffer_until_consumer_registers() {
        let broker = MemoryBroker::new();
        broker.declare_topic_exchange("order_exchange").await.unwrap();
        broker.declare_queue("late.q").await.unwrap();
        broker
            .bind_queue("late.q", "order_exchange", &["#"])
            .await
            .unwrap();

        broker
            .publish("order_exchange", "order.created", b"early".to_vec())
            .await
            .unwrap();

        let seen = Arc::new(AsyncMutex::new(Vec::new()));
        broker
            .consume(
                "late.q",
                Arc::new(Recording {
                    seen: seen.clone(),
                    outcome: HandlerOutcome::Done,
                }),
            )
            .await
            .unwrap();

        eventually("buffered delivery", || async { seen.lock().await.len() == 1 }).await;
    }

    #[tokio::test]
    async fn poison_messages_are_dead_lettered() {
        let broker = MemoryBroker::new();
        broker.declare_topic_exchange("order_exchange").await.unwrap();
        broker.declare_queue("poison.q").await.unwrap();
        broker
            .bind_queue("poison.q", "order_exchange", &["order.*"])
            .await
            .unwrap();

        let seen = Arc::new(AsyncMutex::new(Vec::new()));
        broker
            .consume(
                "poison.q",
                Arc::new(Recording {
                    seen: seen.clone(),
                    outcome: HandlerOutcome::Poison("db down".to_string()),
                }),
            )
            .await
            .unwrap();

        broker
            .publish("order_exchange", "order.created", b"bad".to_vec())
            .await
            .unwrap();

        eventually("dead letter recorded", || async {
            broker.dead_letters().await.len() == 1
        })
        .await;

        let dead = broker.dead_letters().await;
        assert_eq!(dead[0].queue, "poison.q");
        assert_eq!(dead[0].routing_key, "order.created");
        assert_eq!(dead[0].reason, "db down");
    }

    #[tokio::test]
    async fn fanout_to_multiple_bound_queues() {
        let broker = MemoryBroker::new();
        broker.declare_topic_exchange("order_exchange").await.unwrap();
        broker.declare_queue("a.q").await.unwrap();
        broker.declare_queue("b.q").await.unwrap();
        broker
            .bind_queue("a.q", "order_exchange", &["payment.succeeded"])
            .await
            .unwrap();
        broker
            .bind_queue("b.q", "order_exchange", &["payment.*"])
            .await
            .unwrap();

        let counter = Arc::new(AtomicUsize::new(0));

        struct Counting(Arc<AtomicUsize>);

        #[async_trait]
        impl EventHandler for Counting {
            async fn handle(&self, _routing_key: &str, _body: &[u8]) -> HandlerOutcome {
                self.0.fetch_add(1, Ordering::SeqCst);
                HandlerOutcome::Done
            }
        }

        broker
            .consume("a.q", Arc::new(Counting(counter.clone())))
            .await
            .unwrap();
        broker
            .consume("b.q", Arc::new(Counting(counter.clone())))
            .await
            .unwrap();

        broker
            .publish("order_exchange", "payment.succeeded", b"{}".to_vec())
            .await
            .unwrap();

        eventually("both queues delivered", || async {
            counter.load(Ordering::SeqCst) == 2
        })
        .await;
    }

    #[tokio::test]
    async fn publish_to_undeclared_exchange_fails() {
        let broker = MemoryBroker::new();
        let err = broker
            .publish("nope", "order.created", vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::PublishFailed(_)));
    }
}
